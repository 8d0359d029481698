//! One- and two-byte opcode maps.
//!
//! Every byte value has an entry. Group entries are resolved by `ModRM.reg`
//! (peeked, not consumed); the `lock` bit on an instruction entry says
//! whether a LOCK prefix is acceptable at all, the handler still rejects it
//! for register destinations.

use iem_types::Mnemonic;

use super::ops_alu::*;
use super::ops_control::*;
use super::ops_data::*;
use super::ops_string::*;
use super::ops_system::*;
use super::OpFn;

#[derive(Clone, Copy)]
pub(crate) enum OpEntry {
    Op { handler: OpFn, lock: bool },
    /// Sub-table indexed by `ModRM.reg`.
    Group(&'static [OpEntry; 8]),
    /// `0F`: continue in [`TWO_BYTE_MAP`].
    Escape,
    /// Consumed by the prefix loop; never dispatched.
    Prefix,
    /// Recognized but not executed.
    Stub(Mnemonic),
    Invalid,
}

const fn op(handler: OpFn) -> OpEntry {
    OpEntry::Op {
        handler,
        lock: false,
    }
}

const fn lockable(handler: OpFn) -> OpEntry {
    OpEntry::Op {
        handler,
        lock: true,
    }
}

const fn stub(mnemonic: Mnemonic) -> OpEntry {
    OpEntry::Stub(mnemonic)
}

const INVALID: OpEntry = OpEntry::Invalid;

/// Public view of an opcode map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Instruction,
    Group,
    Escape,
    Prefix,
    Stub(Mnemonic),
    Invalid,
}

impl OpEntry {
    fn class(&self) -> OpClass {
        match self {
            OpEntry::Op { .. } => OpClass::Instruction,
            OpEntry::Group(_) => OpClass::Group,
            OpEntry::Escape => OpClass::Escape,
            OpEntry::Prefix => OpClass::Prefix,
            OpEntry::Stub(mnemonic) => OpClass::Stub(*mnemonic),
            OpEntry::Invalid => OpClass::Invalid,
        }
    }
}

pub fn classify_one_byte(opcode: u8) -> OpClass {
    ONE_BYTE_MAP[opcode as usize].class()
}

pub fn classify_two_byte(opcode: u8) -> OpClass {
    TWO_BYTE_MAP[opcode as usize].class()
}

/// Class of a group member, for group entries of either map.
pub fn classify_group_member(two_byte: bool, opcode: u8, reg: u8) -> Option<OpClass> {
    let map = if two_byte { &TWO_BYTE_MAP } else { &ONE_BYTE_MAP };
    match map[opcode as usize] {
        OpEntry::Group(table) => Some(table[(reg & 7) as usize].class()),
        _ => None,
    }
}

/// `80`, `81`, `83`.
static GROUP1: [OpEntry; 8] = [
    lockable(op_grp1::<0>),
    lockable(op_grp1::<1>),
    lockable(op_grp1::<2>),
    lockable(op_grp1::<3>),
    lockable(op_grp1::<4>),
    lockable(op_grp1::<5>),
    lockable(op_grp1::<6>),
    op(op_grp1::<7>),
];

static GROUP1_82: [OpEntry; 8] = [
    lockable(op_grp1_82::<0>),
    lockable(op_grp1_82::<1>),
    lockable(op_grp1_82::<2>),
    lockable(op_grp1_82::<3>),
    lockable(op_grp1_82::<4>),
    lockable(op_grp1_82::<5>),
    lockable(op_grp1_82::<6>),
    op(op_grp1_82::<7>),
];

static GROUP1A: [OpEntry; 8] = [
    op(op_pop_ev),
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
];

/// `C0`, `C1`, `D0..=D3`; the handler picks the count source by opcode.
static GROUP2: [OpEntry; 8] = [
    op(op_grp2::<0>),
    op(op_grp2::<1>),
    op(op_grp2::<2>),
    op(op_grp2::<3>),
    op(op_grp2::<4>),
    op(op_grp2::<5>),
    INVALID,
    op(op_grp2::<7>),
];

static GROUP3: [OpEntry; 8] = [
    op(op_grp3_test),
    INVALID,
    lockable(op_grp3_not),
    lockable(op_grp3_neg),
    op(op_grp3_muldiv::<4>),
    op(op_grp3_muldiv::<5>),
    op(op_grp3_muldiv::<6>),
    op(op_grp3_muldiv::<7>),
];

static GROUP4: [OpEntry; 8] = [
    lockable(op_inc_rm),
    lockable(op_dec_rm),
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
];

static GROUP5: [OpEntry; 8] = [
    lockable(op_inc_rm),
    lockable(op_dec_rm),
    op(op_call_ev),
    op(op_call_mp),
    op(op_jmp_ev),
    op(op_jmp_mp),
    op(op_push_ev),
    INVALID,
];

static GROUP11: [OpEntry; 8] = [
    op(op_mov_e_imm),
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    INVALID,
];

static GROUP6: [OpEntry; 8] = [
    op(op_grp6::<0>),
    op(op_grp6::<1>),
    op(op_grp6::<2>),
    op(op_grp6::<3>),
    op(op_grp6::<4>),
    op(op_grp6::<5>),
    INVALID,
    INVALID,
];

/// Register forms are sub-dispatched on `rm` by the handler.
static GROUP7: [OpEntry; 8] = [
    op(op_grp7::<0>),
    op(op_grp7::<1>),
    op(op_grp7::<2>),
    op(op_grp7::<3>),
    op(op_grp7::<4>),
    op(op_grp7::<5>),
    op(op_grp7::<6>),
    op(op_grp7::<7>),
];

static GROUP8: [OpEntry; 8] = [
    INVALID,
    INVALID,
    INVALID,
    INVALID,
    op(op_grp8::<4>),
    lockable(op_grp8::<5>),
    lockable(op_grp8::<6>),
    lockable(op_grp8::<7>),
];

pub(crate) static ONE_BYTE_MAP: [OpEntry; 256] = [
    // 00
    lockable(op_eb_gb::<0>),
    lockable(op_ev_gv::<0>),
    op(op_gb_eb::<0>),
    op(op_gv_ev::<0>),
    op(op_al_ib::<0>),
    op(op_rax_iz::<0>),
    op(op_push_sreg),
    op(op_pop_sreg),
    // 08
    lockable(op_eb_gb::<1>),
    lockable(op_ev_gv::<1>),
    op(op_gb_eb::<1>),
    op(op_gv_ev::<1>),
    op(op_al_ib::<1>),
    op(op_rax_iz::<1>),
    op(op_push_sreg),
    OpEntry::Escape,
    // 10
    lockable(op_eb_gb::<2>),
    lockable(op_ev_gv::<2>),
    op(op_gb_eb::<2>),
    op(op_gv_ev::<2>),
    op(op_al_ib::<2>),
    op(op_rax_iz::<2>),
    op(op_push_sreg),
    op(op_pop_sreg),
    // 18
    lockable(op_eb_gb::<3>),
    lockable(op_ev_gv::<3>),
    op(op_gb_eb::<3>),
    op(op_gv_ev::<3>),
    op(op_al_ib::<3>),
    op(op_rax_iz::<3>),
    op(op_push_sreg),
    op(op_pop_sreg),
    // 20
    lockable(op_eb_gb::<4>),
    lockable(op_ev_gv::<4>),
    op(op_gb_eb::<4>),
    op(op_gv_ev::<4>),
    op(op_al_ib::<4>),
    op(op_rax_iz::<4>),
    OpEntry::Prefix,
    stub(Mnemonic::Daa),
    // 28
    lockable(op_eb_gb::<5>),
    lockable(op_ev_gv::<5>),
    op(op_gb_eb::<5>),
    op(op_gv_ev::<5>),
    op(op_al_ib::<5>),
    op(op_rax_iz::<5>),
    OpEntry::Prefix,
    stub(Mnemonic::Das),
    // 30
    lockable(op_eb_gb::<6>),
    lockable(op_ev_gv::<6>),
    op(op_gb_eb::<6>),
    op(op_gv_ev::<6>),
    op(op_al_ib::<6>),
    op(op_rax_iz::<6>),
    OpEntry::Prefix,
    stub(Mnemonic::Aaa),
    // 38
    op(op_eb_gb::<7>),
    op(op_ev_gv::<7>),
    op(op_gb_eb::<7>),
    op(op_gv_ev::<7>),
    op(op_al_ib::<7>),
    op(op_rax_iz::<7>),
    OpEntry::Prefix,
    stub(Mnemonic::Aas),
    // 40
    op(op_inc_reg),
    op(op_inc_reg),
    op(op_inc_reg),
    op(op_inc_reg),
    op(op_inc_reg),
    op(op_inc_reg),
    op(op_inc_reg),
    op(op_inc_reg),
    // 48
    op(op_dec_reg),
    op(op_dec_reg),
    op(op_dec_reg),
    op(op_dec_reg),
    op(op_dec_reg),
    op(op_dec_reg),
    op(op_dec_reg),
    op(op_dec_reg),
    // 50
    op(op_push_reg),
    op(op_push_reg),
    op(op_push_reg),
    op(op_push_reg),
    op(op_push_reg),
    op(op_push_reg),
    op(op_push_reg),
    op(op_push_reg),
    // 58
    op(op_pop_reg),
    op(op_pop_reg),
    op(op_pop_reg),
    op(op_pop_reg),
    op(op_pop_reg),
    op(op_pop_reg),
    op(op_pop_reg),
    op(op_pop_reg),
    // 60
    op(op_pusha_popa),
    op(op_pusha_popa),
    stub(Mnemonic::Bound),
    op(op_arpl_movsxd),
    OpEntry::Prefix,
    OpEntry::Prefix,
    OpEntry::Prefix,
    OpEntry::Prefix,
    // 68
    op(op_push_imm),
    op(op_imul_gv_ev_imm),
    op(op_push_imm),
    op(op_imul_gv_ev_imm),
    op(op_ins),
    op(op_ins),
    op(op_outs),
    op(op_outs),
    // 70
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    // 78
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    op(op_jcc_rel8),
    // 80
    OpEntry::Group(&GROUP1),
    OpEntry::Group(&GROUP1),
    OpEntry::Group(&GROUP1_82),
    OpEntry::Group(&GROUP1),
    op(op_test_e_g),
    op(op_test_e_g),
    lockable(op_xchg_e_g),
    lockable(op_xchg_e_g),
    // 88
    op(op_mov_e_g),
    op(op_mov_e_g),
    op(op_mov_g_e),
    op(op_mov_g_e),
    op(op_mov_ev_sw),
    op(op_lea),
    op(op_mov_sw_ew),
    OpEntry::Group(&GROUP1A),
    // 90
    op(op_nop),
    op(op_xchg_rax),
    op(op_xchg_rax),
    op(op_xchg_rax),
    op(op_xchg_rax),
    op(op_xchg_rax),
    op(op_xchg_rax),
    op(op_xchg_rax),
    // 98
    op(op_cbw),
    op(op_cwd),
    op(op_call_ap),
    stub(Mnemonic::Wait),
    op(op_pushf_popf),
    op(op_pushf_popf),
    op(op_sahf),
    op(op_lahf),
    // A0
    op(op_mov_moffs),
    op(op_mov_moffs),
    op(op_mov_moffs),
    op(op_mov_moffs),
    op(op_movs),
    op(op_movs),
    op(op_cmps),
    op(op_cmps),
    // A8
    op(op_test_acc_imm),
    op(op_test_acc_imm),
    op(op_stos),
    op(op_stos),
    op(op_lods),
    op(op_lods),
    op(op_scas),
    op(op_scas),
    // B0
    op(op_mov_r8_ib),
    op(op_mov_r8_ib),
    op(op_mov_r8_ib),
    op(op_mov_r8_ib),
    op(op_mov_r8_ib),
    op(op_mov_r8_ib),
    op(op_mov_r8_ib),
    op(op_mov_r8_ib),
    // B8
    op(op_mov_r_imm),
    op(op_mov_r_imm),
    op(op_mov_r_imm),
    op(op_mov_r_imm),
    op(op_mov_r_imm),
    op(op_mov_r_imm),
    op(op_mov_r_imm),
    op(op_mov_r_imm),
    // C0
    OpEntry::Group(&GROUP2),
    OpEntry::Group(&GROUP2),
    op(op_ret_near),
    op(op_ret_near),
    op(op_les_lds_vex),
    op(op_les_lds_vex),
    OpEntry::Group(&GROUP11),
    OpEntry::Group(&GROUP11),
    // C8
    stub(Mnemonic::Enter),
    op(op_leave),
    op(op_ret_far),
    op(op_ret_far),
    op(op_int3),
    op(op_int),
    op(op_into),
    op(op_iret),
    // D0
    OpEntry::Group(&GROUP2),
    OpEntry::Group(&GROUP2),
    OpEntry::Group(&GROUP2),
    OpEntry::Group(&GROUP2),
    stub(Mnemonic::Aam),
    stub(Mnemonic::Aad),
    OpEntry::Invalid,
    op(op_xlat),
    // D8
    stub(Mnemonic::X87),
    stub(Mnemonic::X87),
    stub(Mnemonic::X87),
    stub(Mnemonic::X87),
    stub(Mnemonic::X87),
    stub(Mnemonic::X87),
    stub(Mnemonic::X87),
    stub(Mnemonic::X87),
    // E0
    op(op_loop),
    op(op_loop),
    op(op_loop),
    op(op_loop),
    op(op_in),
    op(op_in),
    op(op_out),
    op(op_out),
    // E8
    op(op_call_relz),
    op(op_jmp_relz),
    op(op_jmp_ap),
    op(op_jmp_rel8),
    op(op_in),
    op(op_in),
    op(op_out),
    op(op_out),
    // F0
    OpEntry::Prefix,
    OpEntry::Invalid,
    OpEntry::Prefix,
    OpEntry::Prefix,
    op(op_hlt_cli_sti),
    op(op_cmc),
    OpEntry::Group(&GROUP3),
    OpEntry::Group(&GROUP3),
    // F8
    op(op_clc),
    op(op_stc),
    op(op_hlt_cli_sti),
    op(op_hlt_cli_sti),
    op(op_cld),
    op(op_std),
    OpEntry::Group(&GROUP4),
    OpEntry::Group(&GROUP5),
];

pub(crate) static TWO_BYTE_MAP: [OpEntry; 256] = [
    // 00
    OpEntry::Group(&GROUP6),
    OpEntry::Group(&GROUP7),
    stub(Mnemonic::Lar),
    stub(Mnemonic::Lsl),
    OpEntry::Invalid,
    op(op_system),
    op(op_system),
    op(op_system),
    // 08
    op(op_system),
    op(op_system),
    OpEntry::Invalid,
    op(op_ud2),
    OpEntry::Invalid,
    op(op_nop_ev),
    stub(Mnemonic::Amd3dNow),
    stub(Mnemonic::Amd3dNow),
    // 10
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // 18
    op(op_nop_ev),
    op(op_nop_ev),
    op(op_nop_ev),
    op(op_nop_ev),
    op(op_nop_ev),
    op(op_nop_ev),
    op(op_nop_ev),
    op(op_nop_ev),
    // 20
    op(op_mov_cr_dr),
    op(op_mov_cr_dr),
    op(op_mov_cr_dr),
    op(op_mov_cr_dr),
    OpEntry::Invalid,
    OpEntry::Invalid,
    OpEntry::Invalid,
    OpEntry::Invalid,
    // 28
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // 30
    op(op_system),
    op(op_system),
    op(op_system),
    op(op_system),
    op(op_system),
    op(op_system),
    OpEntry::Invalid,
    stub(Mnemonic::Getsec),
    // 38
    stub(Mnemonic::ThreeByteEscape),
    OpEntry::Invalid,
    stub(Mnemonic::ThreeByteEscape),
    OpEntry::Invalid,
    OpEntry::Invalid,
    OpEntry::Invalid,
    OpEntry::Invalid,
    OpEntry::Invalid,
    // 40
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    // 48
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    op(op_cmovcc),
    // 50
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // 58
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // 60
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    // 68
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    // 70
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    // 78
    stub(Mnemonic::Vmread),
    stub(Mnemonic::Vmwrite),
    OpEntry::Invalid,
    OpEntry::Invalid,
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Mmx),
    stub(Mnemonic::Mmx),
    // 80
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    // 88
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    op(op_jcc_relz),
    // 90
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    // 98
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    op(op_setcc),
    // A0
    op(op_push_sreg),
    op(op_pop_sreg),
    op(op_system),
    op(op_bt_ev_gv),
    stub(Mnemonic::Shld),
    stub(Mnemonic::Shld),
    OpEntry::Invalid,
    OpEntry::Invalid,
    // A8
    op(op_push_sreg),
    op(op_pop_sreg),
    op(op_system),
    lockable(op_bt_ev_gv),
    stub(Mnemonic::Shrd),
    stub(Mnemonic::Shrd),
    stub(Mnemonic::Group15),
    op(op_imul_gv_ev),
    // B0
    lockable(op_cmpxchg),
    lockable(op_cmpxchg),
    stub(Mnemonic::Lss),
    lockable(op_bt_ev_gv),
    stub(Mnemonic::Lfs),
    stub(Mnemonic::Lgs),
    op(op_movzx_movsx),
    op(op_movzx_movsx),
    // B8
    stub(Mnemonic::Popcnt),
    OpEntry::Invalid,
    OpEntry::Group(&GROUP8),
    lockable(op_bt_ev_gv),
    op(op_bsf_bsr),
    op(op_bsf_bsr),
    op(op_movzx_movsx),
    op(op_movzx_movsx),
    // C0
    lockable(op_xadd),
    lockable(op_xadd),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Group9),
    // C8
    op(op_bswap),
    op(op_bswap),
    op(op_bswap),
    op(op_bswap),
    op(op_bswap),
    op(op_bswap),
    op(op_bswap),
    op(op_bswap),
    // D0
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // D8
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // E0
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // E8
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // F0
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    // F8
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    stub(Mnemonic::Sse),
    OpEntry::Invalid,
];
