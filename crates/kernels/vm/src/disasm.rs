//! Human-readable listing of bytecode.

use jac_foundation::Value;

use crate::bytecode::{unseal, Decoder, Instr};
use crate::MachineError;

fn operands(instr: &Instr) -> String {
    match instr {
        Instr::LoadConst(Value::Null) => "TYPE null".to_string(),
        Instr::LoadConst(Value::Type(ty)) => format!("TYPE {ty}"),
        Instr::LoadConst(Value::Str(s)) => format!("STRING {s:?}"),
        Instr::LoadConst(value) => format!("{} {value}", value.type_name().to_uppercase()),
        Instr::LoadVar(name) | Instr::CreateVar(name) => name.clone(),
        Instr::Compare(op) => op.symbol().to_string(),
        Instr::Increment(op) => format!("{}=", op.binary().symbol()),
        Instr::DebugInfo { line, file } => match file {
            Some(file) => format!("line {line} file {file}"),
            None => format!("line {line}"),
        },
        _ => String::new(),
    }
}

/// One line per instruction: byte offset, mnemonic, operands.
pub fn disassemble(code: &[u8]) -> Result<Vec<String>, MachineError> {
    let body = unseal(code)?;
    Decoder::new(body)
        .map(|item| {
            let (at, instr) = item?;
            let line = format!("{at:04} {:<12} {}", instr.op().mnemonic(), operands(&instr));
            Ok(line.trim_end().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_tree;
    use jac_ir::build::*;

    #[test]
    fn test_disassemble_assignment() {
        let mut tree = assign(name("total"), add(name("total"), string("!")));
        compile_tree(&mut tree, false);
        let listing = disassemble(tree.bytecode.as_deref().unwrap()).unwrap();
        assert_eq!(
            listing,
            vec![
                "0000 LOAD_CONST   STRING \"!\"",
                "0005 LOAD_VAR     total",
                "0012 ADD",
                "0013 CREATE_VAR   total",
                "0020 ASSIGN",
            ]
        );
    }

    #[test]
    fn test_disassemble_rejects_unsealed() {
        assert_eq!(disassemble(&[0x16]), Err(MachineError::BadHeader));
    }
}
