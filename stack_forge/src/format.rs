// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Encoding/decoding primitives for the module image format.
//!
//! An image is laid out as:
//!
//! ```text
//! [version][features][module_count][import_count][entry: 4 bytes]
//! [import fingerprint: 12 bytes] * import_count
//! ([flags][max_stack][arg_slots][local_slots] code...) * functions
//! ```
//!
//! The entry field holds a `call` to the entry function, or four `nop` bytes when the module
//! has no entry point. All multi-byte fields are little-endian.

use core::fmt;

use sha2::{Digest, Sha256};

use crate::opcode::{Features, Opcode};

/// Version byte written at offset 0 of every image.
pub const FORMAT_VERSION: u8 = 1;
/// Length of the fixed image header, including the entry field.
pub const HEADER_LEN: usize = 8;
/// Offset of the module count within the header.
pub const MODULE_COUNT_OFFSET: usize = 2;
/// Offset of the entry field within the header.
pub const ENTRY_OFFSET: usize = 4;
/// Length of one import-table slot.
pub const IMPORT_SLOT_LEN: usize = FINGERPRINT_LEN;
/// Length of a fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 12;
/// Length of a function descriptor.
pub const DESCRIPTOR_LEN: usize = 4;
/// Module byte of a token that refers to the containing module.
pub const THIS_MODULE: u8 = 0xFF;
/// Largest number of imports a module can declare.
pub const MAX_IMPORTS: usize = THIS_MODULE as usize;

/// A decode error for module images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended unexpectedly.
    UnexpectedEof,
    /// A length/offset was out of bounds.
    OutOfBounds,
    /// The image format version is not supported by this decoder.
    UnsupportedVersion {
        /// The version byte found.
        version: u8,
    },
    /// A byte that is not an opcode was found where an instruction was expected.
    UnknownOpcode {
        /// Offset of the byte in the image.
        offset: usize,
        /// The raw byte.
        byte: u8,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::OutOfBounds => write!(f, "out of bounds"),
            Self::UnsupportedVersion { version } => write!(f, "unsupported version {version}"),
            Self::UnknownOpcode { offset, byte } => {
                write!(f, "unknown opcode 0x{byte:02x} at offset {offset}")
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// A simple byte reader with bounds checks.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Creates a reader positioned at `offset`.
    pub fn at(bytes: &'a [u8], offset: usize) -> Result<Self, DecodeError> {
        if offset > bytes.len() {
            return Err(DecodeError::OutOfBounds);
        }
        Ok(Self { bytes, offset })
    }

    /// Returns the current cursor offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .offset
            .checked_add(N)
            .ok_or(DecodeError::OutOfBounds)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.offset = end;
        let mut out = [0; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Reads an `i8`.
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `i16`.
    pub fn read_i16_le(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(DecodeError::OutOfBounds)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.offset = end;
        Ok(slice)
    }

    /// Reads an opcode byte.
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let offset = self.offset;
        let byte = self.read_u8()?;
        Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { offset, byte })
    }

    /// Reads a function token.
    pub fn read_token(&mut self) -> Result<Token, DecodeError> {
        let module = self.read_u8()?;
        let offset = self.read_u16_le()?;
        Ok(Token { module, offset })
    }
}

/// A simple byte writer.
#[derive(Clone, Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a reference to the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the writer and returns the underlying byte buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends a `u8`.
    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    /// Appends an `i8`.
    pub fn write_i8(&mut self, v: i8) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `u16`.
    pub fn write_u16_le(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `i16`.
    pub fn write_i16_le(&mut self, v: i16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `u32`.
    pub fn write_u32_le(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `i32`.
    pub fn write_i32_le(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `u64`.
    pub fn write_u64_le(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `i64`.
    pub fn write_i64_le(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    /// Appends an opcode byte.
    pub fn write_opcode(&mut self, op: Opcode) {
        self.bytes.push(op.byte());
    }

    /// Appends a function token.
    pub fn write_token(&mut self, token: Token) {
        self.write_u8(token.module);
        self.write_u16_le(token.offset);
    }
}

/// A reference to a function: a module byte followed by the function's absolute offset.
///
/// The module byte is [`THIS_MODULE`] for the containing module, otherwise an index into the
/// import table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    /// [`THIS_MODULE`] or an import index.
    pub module: u8,
    /// Offset of the callee's descriptor within its module image.
    pub offset: u16,
}

impl Token {
    /// Encoded token length.
    pub const LEN: usize = 3;

    /// Writes `self` over the token at `at` in `image`.
    pub fn patch(self, image: &mut [u8], at: usize) -> Result<(), DecodeError> {
        let slot = image
            .get_mut(at..at + Self::LEN)
            .ok_or(DecodeError::OutOfBounds)?;
        slot[0] = self.module;
        slot[1..].copy_from_slice(&self.offset.to_le_bytes());
        Ok(())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module == THIS_MODULE {
            write!(f, "self+0x{:04x}", self.offset)
        } else {
            write!(f, "import{}+0x{:04x}", self.module, self.offset)
        }
    }
}

/// Content address of a linked module: the first 12 bytes of the SHA-256 of its image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Computes the fingerprint of `image`.
    #[must_use]
    pub fn of(image: &[u8]) -> Self {
        let digest = Sha256::digest(image);
        let mut out = [0; FINGERPRINT_LEN];
        out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        Self(out)
    }

    /// The raw fingerprint, as written to import slots.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, used as the on-disk file stem.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The fixed part of an image header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Capabilities the module's code needs.
    pub features: Features,
    /// Number of modules in the transitive import closure, this one included.
    pub module_count: u8,
    /// Number of import slots following the header.
    pub import_count: u8,
    /// The entry `call` token, if the module has one.
    pub entry: Option<Token>,
}

impl Header {
    /// Appends the header to `w`.
    pub fn write(&self, w: &mut Writer) {
        w.write_u8(FORMAT_VERSION);
        w.write_u8(self.features.bits());
        w.write_u8(self.module_count);
        w.write_u8(self.import_count);
        match self.entry {
            Some(token) => {
                w.write_opcode(Opcode::Call);
                w.write_token(token);
            }
            None => {
                for _ in 0..Opcode::Call.len() {
                    w.write_opcode(Opcode::Nop);
                }
            }
        }
    }

    /// Decodes the header at the start of `image`.
    pub fn read(image: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(image);
        let version = r.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion { version });
        }
        let features = Features::from_bits(r.read_u8()?);
        let module_count = r.read_u8()?;
        let import_count = r.read_u8()?;
        let entry = match r.read_opcode()? {
            Opcode::Call => Some(r.read_token()?),
            Opcode::Nop => {
                for _ in 1..Opcode::Call.len() {
                    if r.read_opcode()? != Opcode::Nop {
                        return Err(DecodeError::OutOfBounds);
                    }
                }
                None
            }
            _ => {
                return Err(DecodeError::UnknownOpcode {
                    offset: ENTRY_OFFSET,
                    byte: image[ENTRY_OFFSET],
                });
            }
        };
        Ok(Self {
            features,
            module_count,
            import_count,
            entry,
        })
    }

    /// Offset of the first function descriptor.
    #[must_use]
    pub fn code_start(&self) -> usize {
        HEADER_LEN + usize::from(self.import_count) * IMPORT_SLOT_LEN
    }

    /// Reads import slot `index` of `image`.
    pub fn import(image: &[u8], index: u8) -> Result<Fingerprint, DecodeError> {
        let start = HEADER_LEN + usize::from(index) * IMPORT_SLOT_LEN;
        let mut r = Reader::at(image, start)?;
        let mut out = [0; FINGERPRINT_LEN];
        out.copy_from_slice(r.read_bytes(FINGERPRINT_LEN)?);
        Ok(Fingerprint(out))
    }
}

/// The four-byte prefix of every function body.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Descriptor {
    /// Clear locals to zero on entry.
    pub zero_init: bool,
    /// Peak operand stack depth in slots.
    pub max_stack: u8,
    /// Slots taken by arguments.
    pub arg_slots: u8,
    /// Slots taken by locals.
    pub local_slots: u8,
}

impl Descriptor {
    const ZERO_INIT: u8 = 1 << 0;

    /// Appends the encoded descriptor.
    pub fn write(&self, w: &mut Writer) {
        w.write_u8(if self.zero_init { Self::ZERO_INIT } else { 0 });
        w.write_u8(self.max_stack);
        w.write_u8(self.arg_slots);
        w.write_u8(self.local_slots);
    }

    /// Reads a descriptor at the reader's position.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let flags = r.read_u8()?;
        Ok(Self {
            zero_init: flags & Self::ZERO_INIT != 0,
            max_stack: r.read_u8()?,
            arg_slots: r.read_u8()?,
            local_slots: r.read_u8()?,
        })
    }
}
