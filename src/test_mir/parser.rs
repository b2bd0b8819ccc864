// This module parses the textual machine IR used by tests and the riscpi-pei driver. The
// format is line oriented: a function header, optional `attr` and `stack` declarations,
// block labels and one instruction per line, with `;` starting a comment. Mnemonics and
// register names are resolved through the target's instruction and register info, so the
// parser itself knows nothing about RISCPI. Branch targets may name blocks that appear
// later; those references are recorded and patched once the closing brace is reached.

//! Textual machine IR parser.

use super::{ATTR_FRAME_ADDRESS_TAKEN, ATTR_FRAME_POINTER_ALL, ATTR_HAS_CALLS, ATTR_NO_REALIGN, ATTR_VAR_SIZED};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::frame_info::{FrameIndex, MAX_LOCAL_FRAME_SIZE};
use crate::core::machine::{BlockId, MachineFunction, MachineInstr, Operand};
use crate::core::regs::PhysReg;
use crate::core::target_info::{TargetInstrInfo, TargetRegisterInfo};
use std::collections::HashMap;

/// Parse every function in `text`.
pub fn parse_module(
    text: &str,
    tii: &dyn TargetInstrInfo,
    tri: &dyn TargetRegisterInfo,
) -> CodegenResult<Vec<MachineFunction>> {
    Parser::new(text, tii, tri).parse()
}

const UNRESOLVED: BlockId = BlockId(u32::MAX);

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    tii: &'a dyn TargetInstrInfo,
    tri: &'a dyn TargetRegisterInfo,
    functions: Vec<MachineFunction>,

    // Per-function maps
    blocks: HashMap<&'a str, BlockId>,
    block_resolves: Vec<Resolve<'a>>,
}

/// A block reference seen before its label.
#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    block: BlockId,
    inst: usize,
    operand: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, tii: &'a dyn TargetInstrInfo, tri: &'a dyn TargetRegisterInfo) -> Self {
        Self {
            text,
            pos: 0,
            tii,
            tri,
            functions: Vec::new(),
            blocks: HashMap::new(),
            block_resolves: Vec::new(),
        }
    }

    fn parse(mut self) -> CodegenResult<Vec<MachineFunction>> {
        loop {
            self.skip_whitespace(true);
            if self.is_eof() {
                break;
            }
            let keyword = self.read_identifier()?;
            if keyword != "function" {
                return Err(self.error(format!("expected 'function' but found '{keyword}'")));
            }
            self.parse_function()?;
        }
        log::debug!("parsed {} machine functions", self.functions.len());
        Ok(self.functions)
    }

    fn line(&self) -> usize {
        self.text[..self.pos].matches('\n').count() + 1
    }

    fn error(&self, message: impl Into<String>) -> CodegenError {
        CodegenError::parse(self.line(), message)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comments run to the end of the line; the newline itself is kept.
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(false);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> CodegenResult<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!(
                "expected '{}' but found {:?}",
                ch,
                self.current_char()
            )));
        }
        Ok(())
    }

    fn at_line_end(&mut self) -> bool {
        self.skip_whitespace(false);
        matches!(self.current_char(), None | Some('\n'))
    }

    fn expect_line_end(&mut self) -> CodegenResult<()> {
        if !self.at_line_end() {
            return Err(self.error(format!(
                "unexpected {:?} at end of line",
                self.current_char()
            )));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> CodegenResult<&'a str> {
        self.skip_whitespace(false);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' || ch == '.' => {}
            Some(ch) => return Err(self.error(format!("expected identifier but found '{ch}'"))),
            None => return Err(self.error("expected identifier but found end of input")),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | '$') {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_number(&mut self) -> CodegenResult<i64> {
        self.skip_whitespace(false);
        let negative = self.current_char() == Some('-');
        if negative {
            self.advance();
        }

        let start = self.pos;
        let is_hex = self.text[self.pos..].starts_with("0x") || self.text[self.pos..].starts_with("0X");
        if is_hex {
            self.pos += 2;
        }
        while let Some(ch) = self.current_char() {
            if (is_hex && ch.is_ascii_hexdigit()) || ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let digits = &self.text[start..self.pos];
        let parsed = if is_hex {
            i64::from_str_radix(&digits[2..], 16)
        } else {
            digits.parse::<i64>()
        };
        let value = parsed.map_err(|e| self.error(format!("invalid number '{digits}': {e}")))?;
        Ok(if negative { -value } else { value })
    }

    fn read_u32(&mut self, what: &str) -> CodegenResult<u32> {
        let value = self.read_number()?;
        u32::try_from(value).map_err(|_| self.error(format!("{what} out of range: {value}")))
    }

    fn parse_function(&mut self) -> CodegenResult<()> {
        let name = self.read_identifier()?;
        if self.functions.iter().any(|f| f.name == name) {
            return Err(self.error(format!("duplicate function '{name}'")));
        }
        self.expect('{')?;
        self.expect_line_end()?;

        let mut mf = MachineFunction::new(name);
        self.blocks.clear();
        self.block_resolves.clear();
        let mut current: Option<BlockId> = None;

        loop {
            self.skip_whitespace(true);
            if self.is_eof() {
                return Err(self.error(format!("function '{name}' is not terminated")));
            }
            if self.try_read('}') {
                self.expect_line_end()?;
                break;
            }

            let ident = self.read_identifier()?;
            if self.try_read(':') {
                if self.blocks.contains_key(ident) {
                    return Err(self.error(format!("duplicate block '{ident}'")));
                }
                let block = mf.add_block(ident);
                self.blocks.insert(ident, block);
                current = Some(block);
                self.expect_line_end()?;
                continue;
            }

            match ident {
                "attr" => self.parse_attr(&mut mf)?,
                "stack" => self.parse_stack_object(&mut mf)?,
                mnemonic => {
                    let block = match current {
                        Some(block) => block,
                        None => {
                            let block = mf.add_block("entry");
                            self.blocks.insert("entry", block);
                            current = Some(block);
                            block
                        }
                    };
                    self.parse_instruction(mnemonic, &mut mf, block)?;
                }
            }
            self.expect_line_end()?;
        }

        self.resolve_blocks(&mut mf)?;
        self.functions.push(mf);
        Ok(())
    }

    fn parse_attr(&mut self, mf: &mut MachineFunction) -> CodegenResult<()> {
        let attr = self.read_identifier()?;
        match attr {
            ATTR_FRAME_POINTER_ALL => mf.attrs.frame_pointer_all = true,
            ATTR_NO_REALIGN => mf.attrs.no_realign_stack = true,
            ATTR_VAR_SIZED => mf.frame_info.has_var_sized_objects = true,
            ATTR_FRAME_ADDRESS_TAKEN => mf.frame_info.frame_address_taken = true,
            ATTR_HAS_CALLS => mf.frame_info.has_calls = true,
            other => return Err(self.error(format!("unknown attribute '{other}'"))),
        }
        Ok(())
    }

    fn parse_stack_object(&mut self, mf: &mut MachineFunction) -> CodegenResult<()> {
        let size = self.read_u32("stack object size")?;
        let keyword = self.read_identifier()?;
        if keyword != "align" {
            return Err(self.error(format!("expected 'align' but found '{keyword}'")));
        }
        let align = self.read_u32("stack object alignment")?;
        if !align.is_power_of_two() {
            return Err(self.error(format!("alignment {align} is not a power of two")));
        }
        mf.frame_info.create_stack_object(size, align);
        if mf.frame_info.estimate_local_size() > MAX_LOCAL_FRAME_SIZE {
            return Err(self.error(format!(
                "stack frame too large: locals exceed {MAX_LOCAL_FRAME_SIZE} bytes"
            )));
        }
        Ok(())
    }

    fn parse_instruction(
        &mut self,
        mnemonic: &'a str,
        mf: &mut MachineFunction,
        block: BlockId,
    ) -> CodegenResult<()> {
        let desc = self
            .tii
            .desc_by_name(mnemonic)
            .ok_or_else(|| self.error(format!("unknown instruction '{mnemonic}'")))?;
        if !self.tii.is_legal(desc) {
            return Err(self.error(format!(
                "instruction '{mnemonic}' is not available on this subtarget"
            )));
        }

        let mut inst = MachineInstr::new(desc);
        let index = mf.block(block).len();
        if !self.at_line_end() {
            loop {
                self.parse_operand(&mut inst, mf, block, index, false)?;
                if !self.try_read(',') {
                    break;
                }
            }
        }
        mf.block_mut(block).push(inst);
        Ok(())
    }

    fn parse_operand(
        &mut self,
        inst: &mut MachineInstr,
        mf: &MachineFunction,
        block: BlockId,
        index: usize,
        in_brackets: bool,
    ) -> CodegenResult<()> {
        self.skip_whitespace(false);
        match self.current_char() {
            Some('#') => {
                self.advance();
                let imm = self.read_number()?;
                inst.operands.push(Operand::Imm(imm));
            }
            Some('%') => {
                self.advance();
                if !self.text[self.pos..].starts_with("stack.") {
                    return Err(self.error("expected '%stack.N'"));
                }
                self.pos += "stack.".len();
                let slot = self.read_u32("frame index")?;
                if slot as usize >= mf.frame_info.num_objects() {
                    return Err(self.error(format!("%stack.{slot} is not declared")));
                }
                if !self.tii.accepts_frame_index(inst.desc()) {
                    return Err(self.error(format!(
                        "'{}' cannot take a frame index operand",
                        inst.desc().name
                    )));
                }
                inst.operands.push(Operand::FrameIndex(FrameIndex(slot)));
            }
            Some('^') => {
                self.advance();
                let name = self.read_identifier()?;
                self.block_resolves.push(Resolve {
                    name,
                    block,
                    inst: index,
                    operand: inst.operands.len(),
                    line: self.line(),
                });
                inst.operands.push(Operand::Block(UNRESOLVED));
            }
            Some('@') => {
                self.advance();
                let name = self.read_identifier()?;
                inst.operands.push(Operand::Symbol(name.to_string()));
            }
            Some('[') if !in_brackets => {
                self.advance();
                self.parse_operand(inst, mf, block, index, true)?;
                if self.try_read(',') {
                    self.parse_operand(inst, mf, block, index, true)?;
                }
                self.expect(']')?;
            }
            _ => {
                let name = self.read_identifier()?;
                if name == "implicit-def" {
                    let reg_name = self.read_identifier()?;
                    let reg = self.register(reg_name)?;
                    inst.implicit_defs.push(reg);
                } else {
                    let reg = self.register(name)?;
                    inst.operands.push(Operand::Reg(reg));
                }
            }
        }
        Ok(())
    }

    fn register(&self, name: &str) -> CodegenResult<PhysReg> {
        self.tri
            .reg_by_name(name)
            .ok_or_else(|| self.error(format!("unknown register '{name}'")))
    }

    fn resolve_blocks(&mut self, mf: &mut MachineFunction) -> CodegenResult<()> {
        for resolve in self.block_resolves.drain(..) {
            let target = self.blocks.get(resolve.name).copied().ok_or_else(|| {
                CodegenError::parse(resolve.line, format!("unknown block '{}'", resolve.name))
            })?;
            mf.block_mut(resolve.block).insts[resolve.inst].operands[resolve.operand] =
                Operand::Block(target);
        }
        Ok(())
    }
}
