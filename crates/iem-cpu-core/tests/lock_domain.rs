use std::sync::{Arc, Mutex};
use std::thread;

use iem_cpu_core::{
    gpr, Access, CpuMode, CpuState, GuestMemory, IemConfig, LockDomain, MemFault, NoComplexOps,
    SegReg, StepOutcome, Vcpu,
};

/// RAM shared between vCPUs. Each physical access takes the mutex on its own,
/// so only the engine's lock domain makes read-modify-write atomic.
#[derive(Clone)]
struct SharedRam(Arc<Mutex<Vec<u8>>>);

impl GuestMemory for SharedRam {
    fn translate(
        &mut self,
        _segment: SegReg,
        linear: u64,
        _len: usize,
        _access: Access,
    ) -> Result<u64, MemFault> {
        Ok(linear)
    }

    fn read_phys(&mut self, paddr: u64, dst: &mut [u8]) -> Result<(), MemFault> {
        let ram = self.0.lock().unwrap();
        let start = paddr as usize;
        dst.copy_from_slice(&ram[start..start + dst.len()]);
        Ok(())
    }

    fn write_phys(&mut self, paddr: u64, src: &[u8]) -> Result<(), MemFault> {
        let mut ram = self.0.lock().unwrap();
        let start = paddr as usize;
        ram[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }
}

#[test]
fn locked_increments_from_two_vcpus_are_not_lost() {
    const ITERATIONS: u32 = 5_000;

    let ram = SharedRam(Arc::new(Mutex::new(vec![0; 0x1000])));
    let locks = Arc::new(LockDomain::new(8));

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let ram = ram.clone();
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let mut cpu = Vcpu::with_shared_locks(
                    CpuState::new(CpuMode::Bits32),
                    ram,
                    NoComplexOps,
                    locks,
                    IemConfig::default(),
                );
                cpu.state.set_gpr(gpr::RBX, 0x40);
                for _ in 0..ITERATIONS {
                    cpu.state.set_rip(0);
                    // lock inc dword [ebx]
                    assert_eq!(
                        cpu.decode_and_execute_one(&[0xF0, 0xFF, 0x03]),
                        StepOutcome::Retired(3)
                    );
                }
                cpu.stats
            })
        })
        .collect();

    for worker in workers {
        let stats = worker.join().unwrap();
        assert_eq!(stats.maps, u64::from(ITERATIONS));
        assert_eq!(stats.commits, u64::from(ITERATIONS));
    }

    let ram = ram.0.lock().unwrap();
    let value = u32::from_le_bytes([ram[0x40], ram[0x41], ram[0x42], ram[0x43]]);
    assert_eq!(value, 2 * ITERATIONS);
}

#[test]
fn xchg_with_memory_is_implicitly_locked() {
    let ram = SharedRam(Arc::new(Mutex::new(vec![0; 0x100])));
    ram.0.lock().unwrap()[0x10..0x14].copy_from_slice(&7u32.to_le_bytes());
    let mut cpu = Vcpu::new(CpuState::new(CpuMode::Bits32), ram.clone(), NoComplexOps);
    cpu.state.set_gpr(gpr::RAX, 0x10);
    cpu.state.set_gpr(gpr::RCX, 9);

    // xchg [eax], ecx
    assert_eq!(cpu.decode_and_execute_one(&[0x87, 0x08]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.gpr(gpr::RCX), 7);
    assert_eq!(ram.0.lock().unwrap()[0x10], 9);
}
