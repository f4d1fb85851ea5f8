//! Bytecode instruction set
//!
//! Variable-length byte encoding: one opcode byte followed by inline
//! operands. Instructions operate on an implicit operand stack.
//!
//! Operand encodings:
//!
//! - integers: a length byte whose high bit is the sign, then the magnitude
//!   as minimal little-endian bytes (zero has no magnitude bytes)
//! - floats: 8 bytes, IEEE-754 little-endian
//! - strings: a length-of-length byte, the byte length as minimal
//!   little-endian bytes, then the escape-encoded text
//! - names: a single length byte then UTF-8 text, so at most 255 bytes
//!
//! Code attached to the tree is sealed with a [`MAGIC`] + [`FORMAT_VERSION`]
//! header.

use jac_foundation::{BinaryOp, CmpOp, IncOp, JacType, LogicalOp, Value};
use jac_ir::escape::{escape, unescape};

use crate::MachineError;

/// Magic bytes prefixed to sealed code.
pub const MAGIC: [u8; 2] = *b"JS";

/// Current bytecode format version.
pub const FORMAT_VERSION: u8 = 1;

const SIGN_BIT: u8 = 0x80;

/// Opcode bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    // === Loads ===
    /// Push a constant: wire type byte then the encoded value
    LoadConst = 0x01,
    /// Push an existing variable by name
    LoadVar = 0x02,
    /// Push a variable, creating it as null if absent
    CreateVar = 0x03,

    // === Arithmetic ===
    Add = 0x10,
    Sub = 0x11,
    Mul = 0x12,
    Div = 0x13,
    Mod = 0x14,
    Pow = 0x15,
    Negate = 0x16,

    // === Logic and comparison ===
    /// Compare the top two operands; operand byte selects the comparison
    Compare = 0x20,
    And = 0x21,
    Or = 0x22,
    Not = 0x23,

    // === Assignment ===
    Assign = 0x30,
    CopyFields = 0x31,
    /// In-place update; operand byte selects the operator
    Increment = 0x32,

    /// Source location marker
    DebugInfo = 0xF0,
}

impl Op {
    pub fn from_byte(byte: u8) -> Option<Op> {
        Some(match byte {
            0x01 => Op::LoadConst,
            0x02 => Op::LoadVar,
            0x03 => Op::CreateVar,
            0x10 => Op::Add,
            0x11 => Op::Sub,
            0x12 => Op::Mul,
            0x13 => Op::Div,
            0x14 => Op::Mod,
            0x15 => Op::Pow,
            0x16 => Op::Negate,
            0x20 => Op::Compare,
            0x21 => Op::And,
            0x22 => Op::Or,
            0x23 => Op::Not,
            0x30 => Op::Assign,
            0x31 => Op::CopyFields,
            0x32 => Op::Increment,
            0xF0 => Op::DebugInfo,
            _ => return None,
        })
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::LoadConst => "LOAD_CONST",
            Op::LoadVar => "LOAD_VAR",
            Op::CreateVar => "CREATE_VAR",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Pow => "POW",
            Op::Negate => "NEGATE",
            Op::Compare => "COMPARE",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::Assign => "ASSIGN",
            Op::CopyFields => "COPY_FIELDS",
            Op::Increment => "INCREMENT",
            Op::DebugInfo => "DEBUG_INFO",
        }
    }
}

/// Wire type tags following `LOAD_CONST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Wire {
    Int = 0x01,
    Float = 0x02,
    Str = 0x03,
    Bool = 0x04,
    /// A type tag operand; the null tag loads `null` itself
    Type = 0x05,
}

fn type_code(ty: JacType) -> u8 {
    match ty {
        JacType::Null => 0,
        JacType::Bool => 1,
        JacType::Int => 2,
        JacType::Float => 3,
        JacType::Str => 4,
        JacType::List => 5,
        JacType::Dict => 6,
        JacType::Node => 7,
        JacType::Edge => 8,
        JacType::Type => 9,
    }
}

fn type_from_code(code: u8) -> Option<JacType> {
    Some(match code {
        0 => JacType::Null,
        1 => JacType::Bool,
        2 => JacType::Int,
        3 => JacType::Float,
        4 => JacType::Str,
        5 => JacType::List,
        6 => JacType::Dict,
        7 => JacType::Node,
        8 => JacType::Edge,
        9 => JacType::Type,
        _ => return None,
    })
}

const CMP_OPS: [CmpOp; 8] = [
    CmpOp::Eq,
    CmpOp::Ne,
    CmpOp::Lt,
    CmpOp::Gt,
    CmpOp::Le,
    CmpOp::Ge,
    CmpOp::In,
    CmpOp::NotIn,
];

const INC_OPS: [IncOp; 4] = [IncOp::Add, IncOp::Sub, IncOp::Mul, IncOp::Div];

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LoadConst(Value),
    LoadVar(String),
    CreateVar(String),
    Binary(BinaryOp),
    Negate,
    Compare(CmpOp),
    Logical(LogicalOp),
    Not,
    Assign,
    CopyFields,
    Increment(IncOp),
    /// `file` is `None` when unchanged since the previous marker.
    DebugInfo { line: u32, file: Option<String> },
}

impl Instr {
    pub fn op(&self) -> Op {
        match self {
            Instr::LoadConst(_) => Op::LoadConst,
            Instr::LoadVar(_) => Op::LoadVar,
            Instr::CreateVar(_) => Op::CreateVar,
            Instr::Binary(op) => match op {
                BinaryOp::Add => Op::Add,
                BinaryOp::Sub => Op::Sub,
                BinaryOp::Mul => Op::Mul,
                BinaryOp::Div => Op::Div,
                BinaryOp::Mod => Op::Mod,
                BinaryOp::Pow => Op::Pow,
            },
            Instr::Negate => Op::Negate,
            Instr::Compare(_) => Op::Compare,
            Instr::Logical(LogicalOp::And) => Op::And,
            Instr::Logical(LogicalOp::Or) => Op::Or,
            Instr::Not => Op::Not,
            Instr::Assign => Op::Assign,
            Instr::CopyFields => Op::CopyFields,
            Instr::Increment(_) => Op::Increment,
            Instr::DebugInfo { .. } => Op::DebugInfo,
        }
    }

    /// Append the encoded instruction to `out`.
    ///
    /// Returns `None`, leaving `out` untouched, when an operand has no
    /// encoding (names over 255 bytes, collection or element constants).
    pub fn encode(&self, out: &mut Vec<u8>) -> Option<()> {
        let mut buf = vec![self.op() as u8];
        match self {
            Instr::LoadConst(value) => encode_const(value, &mut buf)?,
            Instr::LoadVar(name) | Instr::CreateVar(name) => encode_name(name, &mut buf)?,
            Instr::Compare(op) => buf.push(CMP_OPS.iter().position(|c| c == op)? as u8),
            Instr::Increment(op) => buf.push(INC_OPS.iter().position(|c| c == op)? as u8),
            Instr::DebugInfo { line, file } => {
                encode_uint(u64::from(*line), &mut buf);
                match file {
                    Some(file) => encode_name(file, &mut buf)?,
                    None => buf.push(0),
                }
            }
            _ => {}
        }
        out.extend_from_slice(&buf);
        Some(())
    }
}

/// Number of bytes in the minimal little-endian form of `n`.
pub fn byte_length(n: u64) -> u8 {
    ((64 - n.leading_zeros() + 7) / 8) as u8
}

/// Minimal little-endian bytes of `n`; empty for zero.
pub fn to_bytes(n: u64) -> Vec<u8> {
    n.to_le_bytes()[..byte_length(n) as usize].to_vec()
}

/// Inverse of [`to_bytes`]. At most eight bytes are significant.
pub fn from_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)))
}

fn encode_uint(n: u64, out: &mut Vec<u8>) {
    out.push(byte_length(n));
    out.extend(to_bytes(n));
}

fn encode_int(n: i64, out: &mut Vec<u8>) {
    let magnitude = n.unsigned_abs();
    let sign = if n < 0 { SIGN_BIT } else { 0 };
    out.push(byte_length(magnitude) | sign);
    out.extend(to_bytes(magnitude));
}

fn encode_name(name: &str, out: &mut Vec<u8>) -> Option<()> {
    let len = u8::try_from(name.len()).ok()?;
    out.push(len);
    out.extend_from_slice(name.as_bytes());
    Some(())
}

fn encode_const(value: &Value, out: &mut Vec<u8>) -> Option<()> {
    match value {
        Value::Int(n) => {
            out.push(Wire::Int as u8);
            encode_int(*n, out);
        }
        Value::Float(f) => {
            out.push(Wire::Float as u8);
            out.extend(f.to_le_bytes());
        }
        Value::Str(s) => {
            let escaped = escape(s);
            out.push(Wire::Str as u8);
            encode_uint(escaped.len() as u64, out);
            out.extend_from_slice(escaped.as_bytes());
        }
        Value::Bool(b) => {
            out.push(Wire::Bool as u8);
            out.push(u8::from(*b));
        }
        Value::Null => {
            out.push(Wire::Type as u8);
            out.push(type_code(JacType::Null));
        }
        Value::Type(ty) => {
            out.push(Wire::Type as u8);
            out.push(type_code(*ty));
        }
        Value::List(_) | Value::Dict(_) | Value::Element(_) => return None,
    }
    Some(())
}

/// Prefix raw code with the format header.
pub fn seal(raw: &[u8]) -> Vec<u8> {
    let mut code = Vec::with_capacity(raw.len() + 3);
    code.extend_from_slice(&MAGIC);
    code.push(FORMAT_VERSION);
    code.extend_from_slice(raw);
    code
}

/// Strip and check the format header.
pub fn unseal(code: &[u8]) -> Result<&[u8], MachineError> {
    match code {
        [m0, m1, version, rest @ ..] if [*m0, *m1] == MAGIC && *version == FORMAT_VERSION => Ok(rest),
        _ => Err(MachineError::BadHeader),
    }
}

/// Iterator over the instructions of raw (unsealed) code.
///
/// Yields `(offset, instruction)` pairs and stops after the first error.
pub struct Decoder<'a> {
    code: &'a [u8],
    ip: usize,
    failed: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            ip: 0,
            failed: false,
        }
    }

    fn byte(&mut self) -> Result<u8, MachineError> {
        let byte = *self
            .code
            .get(self.ip)
            .ok_or(MachineError::Truncated { at: self.ip })?;
        self.ip += 1;
        Ok(byte)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MachineError> {
        let end = self
            .ip
            .checked_add(n)
            .ok_or(MachineError::Truncated { at: self.ip })?;
        let bytes = self
            .code
            .get(self.ip..end)
            .ok_or(MachineError::Truncated { at: self.ip })?;
        self.ip = end;
        Ok(bytes)
    }

    fn invalid(&self, reason: impl Into<String>) -> MachineError {
        MachineError::InvalidOperand {
            at: self.ip,
            reason: reason.into(),
        }
    }

    fn uint(&mut self) -> Result<u64, MachineError> {
        let len = self.byte()? as usize;
        if len > 8 {
            return Err(self.invalid(format!("{len} byte integer")));
        }
        Ok(from_bytes(self.take(len)?))
    }

    fn int(&mut self) -> Result<i64, MachineError> {
        let head = self.byte()?;
        let len = (head & !SIGN_BIT) as usize;
        if len > 8 {
            return Err(self.invalid(format!("{len} byte integer")));
        }
        let magnitude = i128::from(from_bytes(self.take(len)?));
        let value = if head & SIGN_BIT != 0 { -magnitude } else { magnitude };
        i64::try_from(value).map_err(|_| self.invalid("integer out of range"))
    }

    fn utf8(&self, bytes: &[u8]) -> Result<String, MachineError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| self.invalid("invalid utf-8"))
    }

    fn name(&mut self) -> Result<String, MachineError> {
        let len = self.byte()? as usize;
        let bytes = self.take(len)?;
        self.utf8(bytes)
    }

    fn constant(&mut self) -> Result<Value, MachineError> {
        let wire = self.byte()?;
        Ok(match wire {
            w if w == Wire::Int as u8 => Value::Int(self.int()?),
            w if w == Wire::Float as u8 => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Value::Float(f64::from_le_bytes(raw))
            }
            w if w == Wire::Str as u8 => {
                let len = usize::try_from(self.uint()?).map_err(|_| self.invalid("string too long"))?;
                let bytes = self.take(len)?;
                let text = self.utf8(bytes)?;
                Value::Str(unescape(&text).map_err(|e| self.invalid(e.to_string()))?)
            }
            w if w == Wire::Bool as u8 => Value::Bool(self.byte()? != 0),
            w if w == Wire::Type as u8 => {
                let code = self.byte()?;
                match type_from_code(code) {
                    Some(JacType::Null) => Value::Null,
                    Some(ty) => Value::Type(ty),
                    None => return Err(self.invalid(format!("unknown type tag {code}"))),
                }
            }
            other => return Err(self.invalid(format!("unknown wire type {other}"))),
        })
    }

    fn instr(&mut self) -> Result<Instr, MachineError> {
        let at = self.ip;
        let byte = self.byte()?;
        let op = Op::from_byte(byte).ok_or(MachineError::UnknownOpcode { op: byte, at })?;
        Ok(match op {
            Op::LoadConst => Instr::LoadConst(self.constant()?),
            Op::LoadVar => Instr::LoadVar(self.name()?),
            Op::CreateVar => Instr::CreateVar(self.name()?),
            Op::Add => Instr::Binary(BinaryOp::Add),
            Op::Sub => Instr::Binary(BinaryOp::Sub),
            Op::Mul => Instr::Binary(BinaryOp::Mul),
            Op::Div => Instr::Binary(BinaryOp::Div),
            Op::Mod => Instr::Binary(BinaryOp::Mod),
            Op::Pow => Instr::Binary(BinaryOp::Pow),
            Op::Negate => Instr::Negate,
            Op::Compare => {
                let code = self.byte()?;
                let op = CMP_OPS
                    .get(code as usize)
                    .ok_or_else(|| self.invalid(format!("unknown comparison {code}")))?;
                Instr::Compare(*op)
            }
            Op::And => Instr::Logical(LogicalOp::And),
            Op::Or => Instr::Logical(LogicalOp::Or),
            Op::Not => Instr::Not,
            Op::Assign => Instr::Assign,
            Op::CopyFields => Instr::CopyFields,
            Op::Increment => {
                let code = self.byte()?;
                let op = INC_OPS
                    .get(code as usize)
                    .ok_or_else(|| self.invalid(format!("unknown increment {code}")))?;
                Instr::Increment(*op)
            }
            Op::DebugInfo => {
                let line = u32::try_from(self.uint()?).map_err(|_| self.invalid("line out of range"))?;
                let file = self.name()?;
                Instr::DebugInfo {
                    line,
                    file: (!file.is_empty()).then_some(file),
                }
            }
        })
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<(usize, Instr), MachineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.ip >= self.code.len() {
            return None;
        }
        let at = self.ip;
        match self.instr() {
            Ok(instr) => Some(Ok((at, instr))),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(instr: Instr) -> Vec<u8> {
        let mut out = Vec::new();
        instr.encode(&mut out).unwrap();
        out
    }

    fn decode_one(code: &[u8]) -> Instr {
        let mut decoder = Decoder::new(code);
        let (_, instr) = decoder.next().unwrap().unwrap();
        assert!(decoder.next().is_none());
        instr
    }

    #[test]
    fn test_byte_length() {
        assert_eq!(byte_length(0), 0);
        assert_eq!(byte_length(255), 1);
        assert_eq!(byte_length(256), 2);
        assert_eq!(byte_length(u64::MAX), 8);
        assert_eq!(to_bytes(0x0102), vec![0x02, 0x01]);
        assert_eq!(from_bytes(&[0x02, 0x01]), 0x0102);
    }

    #[test]
    fn test_int_layout() {
        assert_eq!(encoded(Instr::LoadConst(Value::Int(5))), vec![0x01, 0x01, 0x01, 0x05]);
        assert_eq!(encoded(Instr::LoadConst(Value::Int(0))), vec![0x01, 0x01, 0x00]);
        assert_eq!(encoded(Instr::LoadConst(Value::Int(-2))), vec![0x01, 0x01, 0x81, 0x02]);
    }

    #[test]
    fn test_extreme_ints_decode() {
        for n in [i64::MIN, i64::MAX, -1, 1 << 40] {
            let code = encoded(Instr::LoadConst(Value::Int(n)));
            assert_eq!(decode_one(&code), Instr::LoadConst(Value::Int(n)));
        }
    }

    #[test]
    fn test_string_layout_uses_escapes() {
        let code = encoded(Instr::LoadConst(Value::str("a\nb")));
        // op, wire, len-of-len, len, then `a\nb` escaped to four bytes
        assert_eq!(code, vec![0x01, 0x03, 0x01, 0x04, b'a', b'\\', b'n', b'b']);
        assert_eq!(decode_one(&code), Instr::LoadConst(Value::str("a\nb")));

        let unicode = encoded(Instr::LoadConst(Value::str("héllo ✓")));
        assert_eq!(decode_one(&unicode), Instr::LoadConst(Value::str("héllo ✓")));
    }

    #[test]
    fn test_null_is_a_type_constant() {
        let code = encoded(Instr::LoadConst(Value::Null));
        assert_eq!(code, vec![0x01, 0x05, 0x00]);
        assert_eq!(decode_one(&code), Instr::LoadConst(Value::Null));
        let ty = encoded(Instr::LoadConst(Value::Type(JacType::Dict)));
        assert_eq!(decode_one(&ty), Instr::LoadConst(Value::Type(JacType::Dict)));
    }

    #[test]
    fn test_long_names_are_unencodable() {
        let mut out = Vec::new();
        assert!(Instr::LoadVar("x".repeat(256)).encode(&mut out).is_none());
        assert!(out.is_empty());
        assert!(Instr::LoadConst(Value::List(vec![])).encode(&mut out).is_none());
    }

    #[test]
    fn test_debug_info() {
        let code = encoded(Instr::DebugInfo {
            line: 300,
            file: Some("main.jac".into()),
        });
        assert_eq!(&code[..4], &[0xF0, 0x02, 0x2C, 0x01]);
        assert_eq!(
            decode_one(&code),
            Instr::DebugInfo {
                line: 300,
                file: Some("main.jac".into())
            }
        );
        let same_file = encoded(Instr::DebugInfo { line: 3, file: None });
        assert_eq!(same_file, vec![0xF0, 0x01, 0x03, 0x00]);
    }

    #[test]
    fn test_header() {
        let sealed = seal(&[0x23]);
        assert_eq!(&sealed[..3], b"JS\x01");
        assert_eq!(unseal(&sealed).unwrap(), &[0x23]);
        assert_eq!(unseal(b"JS\x02\x23"), Err(MachineError::BadHeader));
        assert_eq!(unseal(&[0x23]), Err(MachineError::BadHeader));
    }

    #[test]
    fn test_decoder_errors() {
        let mut unknown = Decoder::new(&[0x7F]);
        assert_eq!(
            unknown.next(),
            Some(Err(MachineError::UnknownOpcode { op: 0x7F, at: 0 }))
        );
        assert!(unknown.next().is_none());

        let truncated: Vec<_> = Decoder::new(&[0x02, 0x05, b'a']).collect();
        assert!(matches!(truncated[0], Err(MachineError::Truncated { .. })));
    }

    #[test]
    fn test_hostile_string_lengths() {
        // declared length far past the end of the code
        let oversize = [0x01, 0x03, 0x08, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let mut decoder = Decoder::new(&oversize);
        assert!(matches!(
            decoder.next(),
            Some(Err(MachineError::Truncated { .. } | MachineError::InvalidOperand { .. }))
        ));
        assert!(decoder.next().is_none());

        let short = [0x01, 0x03, 0x01, 0x05, b'a', b'b'];
        assert!(matches!(
            Decoder::new(&short).next(),
            Some(Err(MachineError::Truncated { .. }))
        ));

        let wire = Decoder::new(&[0x01, 0x09, 0x00]).next();
        assert!(
            matches!(&wire, Some(Err(MachineError::InvalidOperand { reason, .. })) if reason.contains("unknown wire type 9")),
            "{wire:?}"
        );
    }
}
