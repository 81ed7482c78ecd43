// Here reside the definitions of the small, richly-typed values that the
// decoders and executors pass around, rather than have magic numbers and
// bare u32s everywhere. The decoders are the naturally messy code
// responsible for constructing these from raw instruction words.

use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Size {
    Byte = 1,
    Half = 2,
    Word = 4,
}

impl Size {
    pub fn bytes(&self) -> u32 {
        *self as u32
    }

    pub fn mask(&self) -> u32 {
        match self {
            Size::Byte => 0xff,
            Size::Half => 0xffff,
            Size::Word => 0xffff_ffff,
        }
    }

    pub fn sign_extend(&self, value: u32) -> i32 {
        match self {
            Size::Byte => value as u8 as i8 as i32,
            Size::Half => value as u16 as i16 as i32,
            Size::Word => value as i32,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Size::Byte => "b",
            Size::Half => "h",
            Size::Word => "w",
        };
        write!(f, "{}", s)
    }
}

/// The seven ARM7TDMI processor modes, with their canonical 5-bit CPSR
/// encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    User,
    Fiq,
    Irq,
    Supervisor,
    Abort,
    Undefined,
    System,
}

impl Mode {
    pub fn bits(&self) -> u32 {
        match self {
            Mode::User => 0b10000,
            Mode::Fiq => 0b10001,
            Mode::Irq => 0b10010,
            Mode::Supervisor => 0b10011,
            Mode::Abort => 0b10111,
            Mode::Undefined => 0b11011,
            Mode::System => 0b11111,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Mode> {
        match bits & 0x1f {
            0b10000 => Some(Mode::User),
            0b10001 => Some(Mode::Fiq),
            0b10010 => Some(Mode::Irq),
            0b10011 => Some(Mode::Supervisor),
            0b10111 => Some(Mode::Abort),
            0b11011 => Some(Mode::Undefined),
            0b11111 => Some(Mode::System),
            _ => None,
        }
    }

    /// Index into the banked-register arrays. User and System share a bank.
    pub fn bank_index(&self) -> usize {
        match self {
            Mode::User | Mode::System => 0,
            Mode::Fiq => 1,
            Mode::Irq => 2,
            Mode::Supervisor => 3,
            Mode::Abort => 4,
            Mode::Undefined => 5,
        }
    }

    pub fn has_spsr(&self) -> bool {
        !matches!(self, Mode::User | Mode::System)
    }

    pub fn as_asm(&self) -> &'static str {
        match self {
            Mode::User => "usr",
            Mode::Fiq => "fiq",
            Mode::Irq => "irq",
            Mode::Supervisor => "svc",
            Mode::Abort => "abt",
            Mode::Undefined => "und",
            Mode::System => "sys",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_asm())
    }
}

/// Bit positions within CPSR/SPSR.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PsrBit {
    N = 31,
    Z = 30,
    C = 29,
    V = 28,
    I = 7,
    F = 6,
    T = 5,
}

#[derive(Debug, Default)]
pub struct FlagUpdate {
    pub n: Option<bool>,
    pub z: Option<bool>,
    pub c: Option<bool>,
    pub v: Option<bool>,
}

impl FlagUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, cpsr: u32) -> u32 {
        let mut psr = cpsr;
        if let Some(v) = self.n {
            psr = set_bit(psr, PsrBit::N as u32, v);
        }
        if let Some(v) = self.z {
            psr = set_bit(psr, PsrBit::Z as u32, v);
        }
        if let Some(v) = self.c {
            psr = set_bit(psr, PsrBit::C as u32, v);
        }
        if let Some(v) = self.v {
            psr = set_bit(psr, PsrBit::V as u32, v);
        }
        psr
    }

    pub fn logical(result: u32) -> Self {
        FlagUpdate { n: Some(result & 0x8000_0000 != 0), z: Some(result == 0), c: None, v: None }
    }

    pub fn logical_with_carry(result: u32, carry: bool) -> Self {
        FlagUpdate {
            n: Some(result & 0x8000_0000 != 0),
            z: Some(result == 0),
            c: Some(carry),
            v: None,
        }
    }
}

pub fn set_bit(bitfield: u32, bit: u32, value: bool) -> u32 {
    if value {
        bitfield | (1 << bit)
    } else {
        bitfield & !(1 << bit)
    }
}

pub fn get_bit(bitfield: u32, bit: u32) -> bool {
    bitfield & (1 << bit) != 0
}

/// Result of evaluating the shifter operand of a data-processing instruction:
/// the shifted/rotated value plus the carry-out it produces.
#[derive(Debug, Copy, Clone)]
pub struct Shifted {
    pub value: u32,
    pub carry: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => ShiftKind::Lsl,
            1 => ShiftKind::Lsr,
            2 => ShiftKind::Asr,
            3 => ShiftKind::Ror,
            _ => unreachable!(),
        }
    }

    pub fn as_asm(&self) -> &'static str {
        match self {
            ShiftKind::Lsl => "lsl",
            ShiftKind::Lsr => "lsr",
            ShiftKind::Asr => "asr",
            ShiftKind::Ror => "ror",
        }
    }

    /// Apply the shift with an *immediate* amount, including
    /// the documented special cases for amount 0 (LSL#0 is a no-op, LSR#0 /
    /// ASR#0 are treated as shifts by 32, ROR#0 is RRX).
    pub fn apply_immediate(&self, value: u32, amount: u32, carry_in: bool) -> Shifted {
        match (self, amount) {
            (ShiftKind::Lsl, 0) => Shifted { value, carry: carry_in },
            (ShiftKind::Lsl, n) => shift_left(value, n),
            (ShiftKind::Lsr, 0) => shift_right_logical(value, 32),
            (ShiftKind::Lsr, n) => shift_right_logical(value, n),
            (ShiftKind::Asr, 0) => shift_right_arithmetic(value, 32),
            (ShiftKind::Asr, n) => shift_right_arithmetic(value, n),
            (ShiftKind::Ror, 0) => rotate_right_extended(value, carry_in),
            (ShiftKind::Ror, n) => rotate_right(value, n),
        }
    }

    /// Apply the shift with a *register-specified* amount:
    /// amounts of 0, 32 and >32 are each handled explicitly per shift type.
    pub fn apply_register(&self, value: u32, amount: u32, carry_in: bool) -> Shifted {
        match self {
            ShiftKind::Lsl => match amount {
                0 => Shifted { value, carry: carry_in },
                1..=31 => shift_left(value, amount),
                32 => Shifted { value: 0, carry: value & 1 != 0 },
                _ => Shifted { value: 0, carry: false },
            },
            ShiftKind::Lsr => match amount {
                0 => Shifted { value, carry: carry_in },
                1..=31 => shift_right_logical(value, amount),
                32 => Shifted { value: 0, carry: value & 0x8000_0000 != 0 },
                _ => Shifted { value: 0, carry: false },
            },
            ShiftKind::Asr => match amount {
                0 => Shifted { value, carry: carry_in },
                n if n < 32 => shift_right_arithmetic(value, n),
                _ => shift_right_arithmetic(value, 32),
            },
            ShiftKind::Ror => {
                if amount == 0 {
                    Shifted { value, carry: carry_in }
                } else {
                    let amount = amount % 32;
                    if amount == 0 {
                        Shifted { value, carry: value & 0x8000_0000 != 0 }
                    } else {
                        rotate_right(value, amount)
                    }
                }
            }
        }
    }
}

fn shift_left(value: u32, amount: u32) -> Shifted {
    let carry = amount <= 32 && amount > 0 && (value & (1 << (32 - amount))) != 0;
    let shifted = if amount >= 32 { 0 } else { value << amount };
    Shifted { value: shifted, carry }
}

fn shift_right_logical(value: u32, amount: u32) -> Shifted {
    if amount >= 32 {
        Shifted { value: 0, carry: amount == 32 && value & 0x8000_0000 != 0 }
    } else {
        let carry = (value >> (amount - 1)) & 1 != 0;
        Shifted { value: value >> amount, carry }
    }
}

fn shift_right_arithmetic(value: u32, amount: u32) -> Shifted {
    let value = value as i32;
    if amount >= 32 {
        let filled = if value < 0 { 0xffff_ffff } else { 0 };
        Shifted { value: filled, carry: value < 0 }
    } else {
        let carry = ((value >> (amount - 1)) & 1) != 0;
        Shifted { value: (value >> amount) as u32, carry }
    }
}

fn rotate_right(value: u32, amount: u32) -> Shifted {
    let amount = amount % 32;
    if amount == 0 {
        Shifted { value, carry: value & 0x8000_0000 != 0 }
    } else {
        let result = value.rotate_right(amount);
        Shifted { value: result, carry: result & 0x8000_0000 != 0 }
    }
}

fn rotate_right_extended(value: u32, carry_in: bool) -> Shifted {
    let carry = value & 1 != 0;
    let result = (value >> 1) | ((carry_in as u32) << 31);
    Shifted { value: result, carry }
}

/// The 16 ARM condition codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
    Nv,
}

impl Condition {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0xf {
            0x0 => Condition::Eq,
            0x1 => Condition::Ne,
            0x2 => Condition::Cs,
            0x3 => Condition::Cc,
            0x4 => Condition::Mi,
            0x5 => Condition::Pl,
            0x6 => Condition::Vs,
            0x7 => Condition::Vc,
            0x8 => Condition::Hi,
            0x9 => Condition::Ls,
            0xa => Condition::Ge,
            0xb => Condition::Lt,
            0xc => Condition::Gt,
            0xd => Condition::Le,
            0xe => Condition::Al,
            0xf => Condition::Nv,
            _ => unreachable!(),
        }
    }

    pub fn evaluate(&self, n: bool, z: bool, c: bool, v: bool) -> bool {
        match self {
            Condition::Eq => z,
            Condition::Ne => !z,
            Condition::Cs => c,
            Condition::Cc => !c,
            Condition::Mi => n,
            Condition::Pl => !n,
            Condition::Vs => v,
            Condition::Vc => !v,
            Condition::Hi => c && !z,
            Condition::Ls => !c || z,
            Condition::Ge => n == v,
            Condition::Lt => n != v,
            Condition::Gt => !z && (n == v),
            Condition::Le => z || (n != v),
            Condition::Al => true,
            Condition::Nv => false,
        }
    }

    pub fn as_asm(&self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Cs => "cs",
            Condition::Cc => "cc",
            Condition::Mi => "mi",
            Condition::Pl => "pl",
            Condition::Vs => "vs",
            Condition::Vc => "vc",
            Condition::Hi => "hi",
            Condition::Ls => "ls",
            Condition::Ge => "ge",
            Condition::Lt => "lt",
            Condition::Gt => "gt",
            Condition::Le => "le",
            Condition::Al => "",
            Condition::Nv => "nv",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_asm())
    }
}

/// Additive/subtractive flag computation shared by ARM and Thumb executors;
/// additive ops compute V from sign-equal inputs producing a sign-mismatched
/// result.
pub fn add_with_flags(a: u32, b: u32, carry_in: bool) -> (u32, FlagUpdate) {
    let (r1, c1) = a.overflowing_add(b);
    let (result, c2) = r1.overflowing_add(carry_in as u32);
    let carry = c1 || c2;
    let (ai, bi, ri) = (a as i32, b as i32, result as i32);
    let overflow = (ai >= 0 && bi >= 0 && ri < 0) || (ai < 0 && bi < 0 && ri >= 0);
    (
        result,
        FlagUpdate {
            n: Some(result & 0x8000_0000 != 0),
            z: Some(result == 0),
            c: Some(carry),
            v: Some(overflow),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_with_flags_detects_unsigned_carry_and_signed_overflow() {
        let (result, flags) = add_with_flags(0xffff_ffff, 1, false);
        assert_eq!(result, 0);
        assert_eq!(flags.c, Some(true));
        assert_eq!(flags.z, Some(true));

        let (result, flags) = add_with_flags(0x7fff_ffff, 1, false);
        assert_eq!(result, 0x8000_0000);
        assert_eq!(flags.v, Some(true));
        assert_eq!(flags.n, Some(true));
    }

    #[test]
    fn sub_with_flags_no_borrow_sets_carry() {
        let (result, flags) = sub_with_flags(5, 3, true);
        assert_eq!(result, 2);
        assert_eq!(flags.c, Some(true));

        let (result, flags) = sub_with_flags(3, 5, true);
        assert_eq!(result, 0xffff_fffe);
        assert_eq!(flags.c, Some(false));
    }

    #[test]
    fn lsl_zero_is_a_no_op_preserving_carry() {
        let shifted = ShiftKind::Lsl.apply_immediate(0x1234, 0, true);
        assert_eq!(shifted.value, 0x1234);
        assert!(shifted.carry);
    }

    #[test]
    fn lsr_zero_immediate_means_shift_by_32() {
        let shifted = ShiftKind::Lsr.apply_immediate(0x8000_0000, 0, false);
        assert_eq!(shifted.value, 0);
        assert!(shifted.carry);
    }

    #[test]
    fn ror_zero_immediate_is_rrx() {
        let shifted = ShiftKind::Ror.apply_immediate(0b10, 0, true);
        assert_eq!(shifted.value, 0x8000_0001);
        assert!(!shifted.carry);
    }

    #[test]
    fn lsl_by_register_32_reports_bit_zero_as_carry() {
        let shifted = ShiftKind::Lsl.apply_register(0b11, 32, false);
        assert_eq!(shifted.value, 0);
        assert!(shifted.carry);
    }

    #[test]
    fn condition_codes_match_arm_semantics() {
        assert!(Condition::Eq.evaluate(false, true, false, false));
        assert!(!Condition::Eq.evaluate(false, false, false, false));
        assert!(Condition::Gt.evaluate(false, false, false, false));
        assert!(!Condition::Gt.evaluate(false, true, false, false));
        assert!(Condition::Al.evaluate(false, false, false, false));
        assert!(!Condition::Nv.evaluate(true, true, true, true));
    }
}

/// `carry_in` follows ARM's C-flag convention for subtraction: `true` means
/// "no borrow yet" (plain SUB passes `true`; SBC passes the current C flag).
/// C-out is the "no borrow" sense too: 1 iff unsigned `a >= b + subtrahend`.
pub fn sub_with_flags(a: u32, b: u32, carry_in: bool) -> (u32, FlagUpdate) {
    let subtrahend = b as u64 + (!carry_in) as u64;
    let a64 = a as u64;
    let result = a64.wrapping_sub(subtrahend) as u32;
    let carry = a64 >= subtrahend;
    let (ai, bi, ri) = (a as i32, b as i32, result as i32);
    let overflow = (ai >= 0 && bi < 0 && ri < 0) || (ai < 0 && bi >= 0 && ri >= 0);
    (
        result,
        FlagUpdate {
            n: Some(result & 0x8000_0000 != 0),
            z: Some(result == 0),
            c: Some(carry),
            v: Some(overflow),
        },
    )
}
