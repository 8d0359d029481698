use core::fmt;

macro_rules! mnemonics {
    ($($variant:ident => $text:literal,)*) => {
        /// Stable per-family instruction tag.
        ///
        /// Carried by `NotImplemented` outcomes and trace events; the text form
        /// is only produced on demand via [`Mnemonic::as_str`] / `Display`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($variant,)*
        }

        impl Mnemonic {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $text,)*
                }
            }
        }
    };
}

mnemonics! {
    Add => "add",
    Or => "or",
    Adc => "adc",
    Sbb => "sbb",
    And => "and",
    Sub => "sub",
    Xor => "xor",
    Cmp => "cmp",
    Test => "test",
    Inc => "inc",
    Dec => "dec",
    Not => "not",
    Neg => "neg",
    Mul => "mul",
    Imul => "imul",
    Div => "div",
    Idiv => "idiv",
    Rol => "rol",
    Ror => "ror",
    Rcl => "rcl",
    Rcr => "rcr",
    Shl => "shl",
    Shr => "shr",
    Sar => "sar",
    Shld => "shld",
    Shrd => "shrd",
    Bt => "bt",
    Bts => "bts",
    Btr => "btr",
    Btc => "btc",
    Bsf => "bsf",
    Bsr => "bsr",
    Popcnt => "popcnt",
    Bswap => "bswap",
    Xadd => "xadd",
    Cmpxchg => "cmpxchg",
    Mov => "mov",
    MovSreg => "mov sreg",
    MovCr => "mov cr",
    MovDr => "mov dr",
    Movzx => "movzx",
    Movsx => "movsx",
    Movsxd => "movsxd",
    Lea => "lea",
    Xchg => "xchg",
    Cmovcc => "cmovcc",
    Setcc => "setcc",
    Cbw => "cbw",
    Cwd => "cwd",
    Lahf => "lahf",
    Sahf => "sahf",
    Xlat => "xlat",
    Push => "push",
    Pop => "pop",
    PushSreg => "push sreg",
    PopSreg => "pop sreg",
    Pusha => "pusha",
    Popa => "popa",
    Pushf => "pushf",
    Popf => "popf",
    Enter => "enter",
    Leave => "leave",
    Jcc => "jcc",
    Jmp => "jmp",
    JmpFar => "jmp far",
    Call => "call",
    CallFar => "call far",
    Ret => "ret",
    RetFar => "retf",
    Loop => "loop",
    Loope => "loope",
    Loopne => "loopne",
    Jcxz => "jcxz",
    Int3 => "int3",
    Int => "int",
    Into => "into",
    Iret => "iret",
    In => "in",
    Out => "out",
    Ins => "ins",
    Outs => "outs",
    Movs => "movs",
    Cmps => "cmps",
    Stos => "stos",
    Lods => "lods",
    Scas => "scas",
    Clc => "clc",
    Stc => "stc",
    Cmc => "cmc",
    Cld => "cld",
    Std => "std",
    Cli => "cli",
    Sti => "sti",
    Hlt => "hlt",
    Nop => "nop",
    Pause => "pause",
    Ud2 => "ud2",
    Wait => "wait",
    Daa => "daa",
    Das => "das",
    Aaa => "aaa",
    Aas => "aas",
    Aam => "aam",
    Aad => "aad",
    Bound => "bound",
    Arpl => "arpl",
    Les => "les",
    Lds => "lds",
    Lss => "lss",
    Lfs => "lfs",
    Lgs => "lgs",
    Lar => "lar",
    Lsl => "lsl",
    Sldt => "sldt",
    Str => "str",
    Lldt => "lldt",
    Ltr => "ltr",
    Verr => "verr",
    Verw => "verw",
    Sgdt => "sgdt",
    Sidt => "sidt",
    Lgdt => "lgdt",
    Lidt => "lidt",
    Smsw => "smsw",
    Lmsw => "lmsw",
    Invlpg => "invlpg",
    Vmcall => "vmcall",
    Vmlaunch => "vmlaunch",
    Vmresume => "vmresume",
    Vmxoff => "vmxoff",
    Vmread => "vmread",
    Vmwrite => "vmwrite",
    Monitor => "monitor",
    Mwait => "mwait",
    Xgetbv => "xgetbv",
    Xsetbv => "xsetbv",
    Swapgs => "swapgs",
    Rdtscp => "rdtscp",
    Clts => "clts",
    Invd => "invd",
    Wbinvd => "wbinvd",
    Syscall => "syscall",
    Sysret => "sysret",
    Sysenter => "sysenter",
    Sysexit => "sysexit",
    Wrmsr => "wrmsr",
    Rdmsr => "rdmsr",
    Rdtsc => "rdtsc",
    Rdpmc => "rdpmc",
    Cpuid => "cpuid",
    Rsm => "rsm",
    Getsec => "getsec",
    Group9 => "group9",
    Group15 => "group15",
    X87 => "x87",
    Mmx => "mmx",
    Sse => "sse",
    Vex => "vex",
    Amd3dNow => "3dnow",
    ThreeByteEscape => "0f38/0f3a",
}

impl Mnemonic {
    /// Families whose only encodings are undefined in 64-bit mode.
    pub const fn is_invalid_in_long_mode(self) -> bool {
        matches!(
            self,
            Mnemonic::Daa
                | Mnemonic::Das
                | Mnemonic::Aaa
                | Mnemonic::Aas
                | Mnemonic::Aam
                | Mnemonic::Aad
                | Mnemonic::Bound
                | Mnemonic::Les
                | Mnemonic::Lds
                | Mnemonic::Pusha
                | Mnemonic::Popa
                | Mnemonic::Into
        )
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
