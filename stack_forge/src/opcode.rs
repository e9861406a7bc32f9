// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Target opcode table.
//!
//! Every opcode has a fixed byte value, an operand [`Shape`] that fixes its encoded length,
//! and the [`Features`] a VM must support to execute it. Byte values are part of the image
//! format and must never be renumbered.

/// VM capability classes that an image may require.
///
/// The image header records the union of the features of every opcode emitted into it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Features(u8);

impl core::ops::BitOr for Features {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for Features {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Features {
    /// Baseline 32-bit integer machine.
    pub const NONE: Self = Self(0);
    /// 64-bit integer arithmetic and moves.
    pub const INT64: Self = Self(1 << 0);
    /// Single-precision floating point.
    pub const FLOAT32: Self = Self(1 << 1);
    /// Double-precision floating point.
    pub const FLOAT64: Self = Self(1 << 2);
    /// Addresses, indirect memory access and allocation.
    pub const MEMORY: Self = Self(1 << 3);
    /// Function values and indirect calls.
    pub const INDIRECT_CALL: Self = Self(1 << 4);
    /// Host system calls.
    pub const SYSCALL: Self = Self(1 << 5);

    /// Builds a set from its header byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The header byte for this set.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Both sets combined.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if this set includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if every bit of `self` is also set in `other`.
    #[must_use]
    pub const fn is_subset_of(self, other: Self) -> bool {
        other.contains(self)
    }
}

impl core::fmt::Display for Features {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        const NAMES: [&str; 6] = ["int64", "float32", "float64", "memory", "indirect-call", "syscall"];
        if self.0 == 0 {
            return f.write_str("none");
        }
        let mut first = true;
        for (bit, name) in NAMES.iter().enumerate() {
            if self.0 & (1 << bit) != 0 {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Operand layout following an opcode byte. All multi-byte fields are little-endian.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    /// No operand.
    None,
    /// One unsigned byte (slot count).
    U8,
    /// One `u16` (syscall id).
    U16,
    /// A 3-byte function token: module byte then `u16` offset.
    Token,
    /// A function token followed by a slot count.
    TokenU8,
    /// A little-endian `i32`.
    I32,
    /// A little-endian `i64`.
    I64,
    /// IEEE-754 single bits.
    F32,
    /// IEEE-754 double bits.
    F64,
    /// A frame slot index.
    Slot,
    /// A frame slot index followed by a slot count.
    SlotCount,
    /// A `u16` byte offset.
    Offset,
    /// A `u16` byte offset followed by a `u16` byte size.
    OffsetSize,
    /// A `u16` byte size.
    Size,
    /// A signed 8-bit displacement from the end of the instruction.
    Rel8,
    /// A signed 16-bit displacement from the end of the instruction.
    Rel16,
}

impl Shape {
    /// Operand length in bytes.
    #[must_use]
    pub const fn operand_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 | Self::Slot | Self::Rel8 => 1,
            Self::U16 | Self::SlotCount | Self::Offset | Self::Size | Self::Rel16 => 2,
            Self::Token => 3,
            Self::TokenU8 | Self::I32 | Self::F32 | Self::OffsetSize => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

const I64: Features = Features::INT64;
const F32: Features = Features::FLOAT32;
const F64: Features = Features::FLOAT64;
const MEM: Features = Features::MEMORY;
const IND: Features = Features::INDIRECT_CALL;
const SYS: Features = Features::SYSCALL;
const BASE: Features = Features::NONE;

macro_rules! opcodes {
    ($($name:ident = $byte:literal, $mnemonic:literal, $shape:ident, $features:expr;)*) => {
        /// A target opcode.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                $name = $byte,
            )*
        }

        impl Opcode {
            /// Every opcode in byte order.
            pub const ALL: &'static [Self] = &[$(Self::$name,)*];

            /// The encoded byte.
            #[must_use]
            pub const fn byte(self) -> u8 {
                self as u8
            }

            /// Decodes an opcode byte.
            #[must_use]
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Assembly name, as printed by the disassembler.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }

            /// Operand layout.
            #[must_use]
            pub const fn shape(self) -> Shape {
                match self {
                    $(Self::$name => Shape::$shape,)*
                }
            }

            /// Capabilities a VM needs to execute this opcode.
            #[must_use]
            pub const fn features(self) -> Features {
                match self {
                    $(Self::$name => $features,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None, BASE;
    Ret = 0x01, "ret", None, BASE;
    RetW32 = 0x02, "ret.w32", None, BASE;
    RetW64 = 0x03, "ret.w64", None, BASE;
    RetBlock = 0x04, "ret.blk", U8, BASE;
    Dup32 = 0x05, "dup.w32", None, BASE;
    Dup64 = 0x06, "dup.w64", None, BASE;
    DupBlock = 0x07, "dup.blk", U8, BASE;
    Pop32 = 0x08, "pop.w32", None, BASE;
    Pop64 = 0x09, "pop.w64", None, BASE;
    PopBlock = 0x0A, "pop.blk", U8, BASE;
    LdNull = 0x0B, "ldnull", None, MEM;
    Syscall = 0x0C, "syscall", U16, SYS;
    Call = 0x0D, "call", Token, BASE;
    NewObj = 0x0E, "newobj", TokenU8, MEM;
    LdFtn = 0x0F, "ldftn", Token, IND;
    CallI = 0x10, "calli", None, IND;
    LdcI32 = 0x11, "ldc.i32", I32, BASE;
    LdcI64 = 0x12, "ldc.i64", I64, I64;
    LdcF32 = 0x13, "ldc.f32", F32, F32;
    LdcF64 = 0x14, "ldc.f64", F64, F64;

    LdSlot32 = 0x18, "ldslot.w32", Slot, BASE;
    LdSlot64 = 0x19, "ldslot.w64", Slot, BASE;
    LdSlotBlock = 0x1A, "ldslot.blk", SlotCount, BASE;
    StSlotI8 = 0x1B, "stslot.i8", Slot, BASE;
    StSlotU8 = 0x1C, "stslot.u8", Slot, BASE;
    StSlotI16 = 0x1D, "stslot.i16", Slot, BASE;
    StSlotU16 = 0x1E, "stslot.u16", Slot, BASE;
    StSlot32 = 0x1F, "stslot.w32", Slot, BASE;
    StSlot64 = 0x20, "stslot.w64", Slot, BASE;
    StSlotBlock = 0x21, "stslot.blk", SlotCount, BASE;
    LdSlotAddr = 0x22, "ldslota", Slot, MEM;

    AddI32 = 0x30, "add.i32", None, BASE;
    AddI64 = 0x31, "add.i64", None, I64;
    AddF32 = 0x32, "add.f32", None, F32;
    AddF64 = 0x33, "add.f64", None, F64;
    SubI32 = 0x34, "sub.i32", None, BASE;
    SubI64 = 0x35, "sub.i64", None, I64;
    SubF32 = 0x36, "sub.f32", None, F32;
    SubF64 = 0x37, "sub.f64", None, F64;
    MulI32 = 0x38, "mul.i32", None, BASE;
    MulI64 = 0x39, "mul.i64", None, I64;
    MulF32 = 0x3A, "mul.f32", None, F32;
    MulF64 = 0x3B, "mul.f64", None, F64;
    DivI32 = 0x3C, "div.i32", None, BASE;
    DivI64 = 0x3D, "div.i64", None, I64;
    DivF32 = 0x3E, "div.f32", None, F32;
    DivF64 = 0x3F, "div.f64", None, F64;
    RemI32 = 0x40, "rem.i32", None, BASE;
    RemI64 = 0x41, "rem.i64", None, I64;
    RemF32 = 0x42, "rem.f32", None, F32;
    RemF64 = 0x43, "rem.f64", None, F64;
    DivUnI32 = 0x44, "div.un.i32", None, BASE;
    DivUnI64 = 0x45, "div.un.i64", None, I64;
    RemUnI32 = 0x46, "rem.un.i32", None, BASE;
    RemUnI64 = 0x47, "rem.un.i64", None, I64;
    AndI32 = 0x48, "and.i32", None, BASE;
    AndI64 = 0x49, "and.i64", None, I64;
    OrI32 = 0x4A, "or.i32", None, BASE;
    OrI64 = 0x4B, "or.i64", None, I64;
    XorI32 = 0x4C, "xor.i32", None, BASE;
    XorI64 = 0x4D, "xor.i64", None, I64;
    ShlI32 = 0x4E, "shl.i32", None, BASE;
    ShlI64 = 0x4F, "shl.i64", None, I64;
    ShrI32 = 0x50, "shr.i32", None, BASE;
    ShrI64 = 0x51, "shr.i64", None, I64;
    ShrUnI32 = 0x52, "shr.un.i32", None, BASE;
    ShrUnI64 = 0x53, "shr.un.i64", None, I64;
    NegI32 = 0x54, "neg.i32", None, BASE;
    NegI64 = 0x55, "neg.i64", None, I64;
    NegF32 = 0x56, "neg.f32", None, F32;
    NegF64 = 0x57, "neg.f64", None, F64;
    NotI32 = 0x58, "not.i32", None, BASE;
    NotI64 = 0x59, "not.i64", None, I64;

    CeqI32 = 0x60, "ceq.i32", None, BASE;
    CeqI64 = 0x61, "ceq.i64", None, I64;
    CeqF32 = 0x62, "ceq.f32", None, F32;
    CeqF64 = 0x63, "ceq.f64", None, F64;
    CgtI32 = 0x64, "cgt.i32", None, BASE;
    CgtI64 = 0x65, "cgt.i64", None, I64;
    CgtF32 = 0x66, "cgt.f32", None, F32;
    CgtF64 = 0x67, "cgt.f64", None, F64;
    CgtUnI32 = 0x68, "cgt.un.i32", None, BASE;
    CgtUnI64 = 0x69, "cgt.un.i64", None, I64;
    CltI32 = 0x6A, "clt.i32", None, BASE;
    CltI64 = 0x6B, "clt.i64", None, I64;
    CltF32 = 0x6C, "clt.f32", None, F32;
    CltF64 = 0x6D, "clt.f64", None, F64;
    CltUnI32 = 0x6E, "clt.un.i32", None, BASE;
    CltUnI64 = 0x6F, "clt.un.i64", None, I64;

    ConvI32ToI8 = 0x70, "conv.i32.i8", None, BASE;
    ConvI32ToU8 = 0x71, "conv.i32.u8", None, BASE;
    ConvI32ToI16 = 0x72, "conv.i32.i16", None, BASE;
    ConvI32ToU16 = 0x73, "conv.i32.u16", None, BASE;
    ConvI32ToI64 = 0x74, "conv.i32.i64", None, I64;
    ConvU32ToI64 = 0x75, "conv.u32.i64", None, I64;
    ConvI64ToI32 = 0x76, "conv.i64.i32", None, I64;
    ConvI32ToF32 = 0x77, "conv.i32.f32", None, F32;
    ConvI32ToF64 = 0x78, "conv.i32.f64", None, F64;
    ConvI64ToF32 = 0x79, "conv.i64.f32", None, I64.union(F32);
    ConvI64ToF64 = 0x7A, "conv.i64.f64", None, I64.union(F64);
    ConvF32ToI32 = 0x7B, "conv.f32.i32", None, F32;
    ConvF32ToI64 = 0x7C, "conv.f32.i64", None, F32.union(I64);
    ConvF64ToI32 = 0x7D, "conv.f64.i32", None, F64;
    ConvF64ToI64 = 0x7E, "conv.f64.i64", None, F64.union(I64);
    ConvF32ToF64 = 0x7F, "conv.f32.f64", None, F32.union(F64);
    ConvF64ToF32 = 0x80, "conv.f64.f32", None, F32.union(F64);

    LdIndI8 = 0x88, "ldind.i8", None, MEM;
    LdIndU8 = 0x89, "ldind.u8", None, MEM;
    LdIndI16 = 0x8A, "ldind.i16", None, MEM;
    LdIndU16 = 0x8B, "ldind.u16", None, MEM;
    LdInd32 = 0x8C, "ldind.w32", None, MEM;
    LdInd64 = 0x8D, "ldind.w64", None, MEM;
    LdIndBlock = 0x8E, "ldind.blk", Size, MEM;
    StInd8 = 0x90, "stind.w8", None, MEM;
    StInd16 = 0x91, "stind.w16", None, MEM;
    StInd32 = 0x92, "stind.w32", None, MEM;
    StInd64 = 0x93, "stind.w64", None, MEM;
    StIndBlock = 0x94, "stind.blk", Size, MEM;
    LdFldI8 = 0x98, "ldfld.i8", Offset, MEM;
    LdFldU8 = 0x99, "ldfld.u8", Offset, MEM;
    LdFldI16 = 0x9A, "ldfld.i16", Offset, MEM;
    LdFldU16 = 0x9B, "ldfld.u16", Offset, MEM;
    LdFld32 = 0x9C, "ldfld.w32", Offset, MEM;
    LdFld64 = 0x9D, "ldfld.w64", Offset, MEM;
    LdFldBlock = 0x9E, "ldfld.blk", OffsetSize, MEM;
    StFld8 = 0xA0, "stfld.w8", Offset, MEM;
    StFld16 = 0xA1, "stfld.w16", Offset, MEM;
    StFld32 = 0xA2, "stfld.w32", Offset, MEM;
    StFld64 = 0xA3, "stfld.w64", Offset, MEM;
    StFldBlock = 0xA4, "stfld.blk", OffsetSize, MEM;
    LdFldA = 0xA5, "ldflda", Offset, MEM;
    LdElemI8 = 0xA8, "ldelem.i8", Size, MEM;
    LdElemU8 = 0xA9, "ldelem.u8", Size, MEM;
    LdElemI16 = 0xAA, "ldelem.i16", Size, MEM;
    LdElemU16 = 0xAB, "ldelem.u16", Size, MEM;
    LdElem32 = 0xAC, "ldelem.w32", Size, MEM;
    LdElem64 = 0xAD, "ldelem.w64", Size, MEM;
    LdElemBlock = 0xAE, "ldelem.blk", Size, MEM;
    StElem8 = 0xB0, "stelem.w8", Size, MEM;
    StElem16 = 0xB1, "stelem.w16", Size, MEM;
    StElem32 = 0xB2, "stelem.w32", Size, MEM;
    StElem64 = 0xB3, "stelem.w64", Size, MEM;
    StElemBlock = 0xB4, "stelem.blk", Size, MEM;
    LdElemA = 0xB5, "ldelema", Size, MEM;
    LdSpanElemI8 = 0xB8, "ldspan.i8", Size, MEM;
    LdSpanElemU8 = 0xB9, "ldspan.u8", Size, MEM;
    LdSpanElemI16 = 0xBA, "ldspan.i16", Size, MEM;
    LdSpanElemU16 = 0xBB, "ldspan.u16", Size, MEM;
    LdSpanElem32 = 0xBC, "ldspan.w32", Size, MEM;
    LdSpanElem64 = 0xBD, "ldspan.w64", Size, MEM;
    LdSpanElemBlock = 0xBE, "ldspan.blk", Size, MEM;
    StSpanElem8 = 0xC0, "stspan.w8", Size, MEM;
    StSpanElem16 = 0xC1, "stspan.w16", Size, MEM;
    StSpanElem32 = 0xC2, "stspan.w32", Size, MEM;
    StSpanElem64 = 0xC3, "stspan.w64", Size, MEM;
    StSpanElemBlock = 0xC4, "stspan.blk", Size, MEM;
    LdSpanElemA = 0xC5, "ldspana", Size, MEM;

    BrS = 0xC8, "br.s", Rel8, BASE;
    BrTrue32S = 0xC9, "brtrue.w32.s", Rel8, BASE;
    BrTrue64S = 0xCA, "brtrue.w64.s", Rel8, I64;
    BrFalse32S = 0xCB, "brfalse.w32.s", Rel8, BASE;
    BrFalse64S = 0xCC, "brfalse.w64.s", Rel8, I64;
    Beq32S = 0xCD, "beq.w32.s", Rel8, BASE;
    Beq64S = 0xCE, "beq.w64.s", Rel8, I64;
    Bne32S = 0xCF, "bne.w32.s", Rel8, BASE;
    Bne64S = 0xD0, "bne.w64.s", Rel8, I64;
    Bge32S = 0xD1, "bge.i32.s", Rel8, BASE;
    Bge64S = 0xD2, "bge.i64.s", Rel8, I64;
    BgeUn32S = 0xD3, "bge.un.i32.s", Rel8, BASE;
    BgeUn64S = 0xD4, "bge.un.i64.s", Rel8, I64;
    Bgt32S = 0xD5, "bgt.i32.s", Rel8, BASE;
    Bgt64S = 0xD6, "bgt.i64.s", Rel8, I64;
    BgtUn32S = 0xD7, "bgt.un.i32.s", Rel8, BASE;
    BgtUn64S = 0xD8, "bgt.un.i64.s", Rel8, I64;
    Ble32S = 0xD9, "ble.i32.s", Rel8, BASE;
    Ble64S = 0xDA, "ble.i64.s", Rel8, I64;
    BleUn32S = 0xDB, "ble.un.i32.s", Rel8, BASE;
    BleUn64S = 0xDC, "ble.un.i64.s", Rel8, I64;
    Blt32S = 0xDD, "blt.i32.s", Rel8, BASE;
    Blt64S = 0xDE, "blt.i64.s", Rel8, I64;
    BltUn32S = 0xDF, "blt.un.i32.s", Rel8, BASE;
    BltUn64S = 0xE0, "blt.un.i64.s", Rel8, I64;
    Br = 0xE1, "br", Rel16, BASE;
    BrTrue32 = 0xE2, "brtrue.w32", Rel16, BASE;
    BrTrue64 = 0xE3, "brtrue.w64", Rel16, I64;
    BrFalse32 = 0xE4, "brfalse.w32", Rel16, BASE;
    BrFalse64 = 0xE5, "brfalse.w64", Rel16, I64;
    Beq32 = 0xE6, "beq.w32", Rel16, BASE;
    Beq64 = 0xE7, "beq.w64", Rel16, I64;
    Bne32 = 0xE8, "bne.w32", Rel16, BASE;
    Bne64 = 0xE9, "bne.w64", Rel16, I64;
    Bge32 = 0xEA, "bge.i32", Rel16, BASE;
    Bge64 = 0xEB, "bge.i64", Rel16, I64;
    BgeUn32 = 0xEC, "bge.un.i32", Rel16, BASE;
    BgeUn64 = 0xED, "bge.un.i64", Rel16, I64;
    Bgt32 = 0xEE, "bgt.i32", Rel16, BASE;
    Bgt64 = 0xEF, "bgt.i64", Rel16, I64;
    BgtUn32 = 0xF0, "bgt.un.i32", Rel16, BASE;
    BgtUn64 = 0xF1, "bgt.un.i64", Rel16, I64;
    Ble32 = 0xF2, "ble.i32", Rel16, BASE;
    Ble64 = 0xF3, "ble.i64", Rel16, I64;
    BleUn32 = 0xF4, "ble.un.i32", Rel16, BASE;
    BleUn64 = 0xF5, "ble.un.i64", Rel16, I64;
    Blt32 = 0xF6, "blt.i32", Rel16, BASE;
    Blt64 = 0xF7, "blt.i64", Rel16, I64;
    BltUn32 = 0xF8, "blt.un.i32", Rel16, BASE;
    BltUn64 = 0xF9, "blt.un.i64", Rel16, I64;
}

/// Distance between a short branch opcode and its long form.
const LONG_BRANCH_DELTA: u8 = Opcode::Br as u8 - Opcode::BrS as u8;

impl Opcode {
    /// Encoded length including the opcode byte.
    #[must_use]
    pub const fn len(self) -> usize {
        1 + self.shape().operand_len()
    }

    /// Returns `true` for short and long branches.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(self.shape(), Shape::Rel8 | Shape::Rel16)
    }

    /// For a short branch, the long branch with the same condition.
    #[must_use]
    pub const fn long_form(self) -> Option<Self> {
        match self.shape() {
            Shape::Rel8 => Self::from_byte(self as u8 + LONG_BRANCH_DELTA),
            _ => None,
        }
    }

    /// For a long branch, the short branch with the same condition.
    #[must_use]
    pub const fn short_form(self) -> Option<Self> {
        match self.shape() {
            Shape::Rel16 => Self::from_byte(self as u8 - LONG_BRANCH_DELTA),
            _ => None,
        }
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Ret | Self::RetW32 | Self::RetW64 | Self::RetBlock | Self::BrS | Self::Br
        )
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(Opcode::Nop.byte(), 0x00);
        assert_eq!(Opcode::Ret.byte(), 0x01);
        assert_eq!(Opcode::Call.byte(), 0x0D);
        assert_eq!(Opcode::LdcI32.byte(), 0x11);
        assert_eq!(Opcode::LdSlot32.byte(), 0x18);
        assert_eq!(Opcode::AddI32.byte(), 0x30);
        assert_eq!(Opcode::CeqI32.byte(), 0x60);
        assert_eq!(Opcode::ConvI32ToI8.byte(), 0x70);
        assert_eq!(Opcode::LdIndI8.byte(), 0x88);
        assert_eq!(Opcode::BrS.byte(), 0xC8);
        assert_eq!(Opcode::Br.byte(), 0xE1);
        assert_eq!(Opcode::BltUn64.byte(), 0xF9);
    }

    #[test]
    fn from_byte_roundtrips_and_rejects_holes() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
        assert_eq!(Opcode::from_byte(0x15), None);
        assert_eq!(Opcode::from_byte(0xFF), None);
        let mut seen = [false; 256];
        for &op in Opcode::ALL {
            assert!(!seen[op.byte() as usize], "duplicate byte for {op}");
            seen[op.byte() as usize] = true;
        }
    }

    #[test]
    fn branch_forms_pair_up() {
        let shorts: Vec<_> = Opcode::ALL
            .iter()
            .copied()
            .filter(|op| op.shape() == Shape::Rel8)
            .collect();
        assert_eq!(shorts.len(), 25);
        for op in shorts {
            let long = op.long_form().unwrap();
            assert_eq!(long.shape(), Shape::Rel16);
            assert_eq!(long.short_form(), Some(op));
            assert_eq!(long.features(), op.features());
            assert_eq!(format!("{}.s", long.mnemonic()), op.mnemonic());
        }
        assert_eq!(Opcode::Beq32S.long_form(), Some(Opcode::Beq32));
        assert_eq!(Opcode::Call.long_form(), None);
    }

    #[test]
    fn lengths_follow_shape() {
        assert_eq!(Opcode::Nop.len(), 1);
        assert_eq!(Opcode::Call.len(), 4);
        assert_eq!(Opcode::NewObj.len(), 5);
        assert_eq!(Opcode::LdcI32.len(), 5);
        assert_eq!(Opcode::LdcF64.len(), 9);
        assert_eq!(Opcode::LdSlotBlock.len(), 3);
        assert_eq!(Opcode::LdFldBlock.len(), 5);
        assert_eq!(Opcode::BrS.len(), 2);
        assert_eq!(Opcode::Br.len(), 3);
    }

    #[test]
    fn features_compose() {
        let f = Features::INT64 | Features::SYSCALL;
        assert!(f.contains(Features::INT64));
        assert!(!f.contains(Features::FLOAT32));
        assert!(Features::INT64.is_subset_of(f));
        assert!(!f.is_subset_of(Features::INT64));
        assert_eq!(f.bits(), 0b10_0001);
        assert_eq!(Features::from_bits(f.bits()), f);
        assert_eq!(f.to_string(), "int64|syscall");
        assert_eq!(Features::NONE.to_string(), "none");
        assert_eq!(Opcode::ConvI64ToF64.features(), Features::INT64 | Features::FLOAT64);
    }
}
