use super::builtin::Builtin;
use super::env::{Environment, Slot};
use super::lex::lex;
use super::token::*;
use super::{Error, ErrorCode};
use crate::mach::{Address, Opcode, Program, Register, Syscall, Val};
use std::collections::HashMap;

type Result<T> = std::result::Result<T, Error>;

/// Frame pointer of the active `DEF FN` call.
pub const FP_CELL: Address = 0;
/// Index of the next DATA item to READ.
pub const DATA_CURSOR: Address = 1;
/// First cell of the DATA segment; globals follow it.
pub const DATA_BASE: Address = 2;

const DEFAULT_COLOUR: i16 = 15;
const IMPLICIT_DIM: i16 = 11;
const MAX_CODE: usize = 0x1_0000;

/// Compile BASIC source into a runnable [`Program`].
///
/// Lines may carry a line number for GOTO and GOSUB. The entry point
/// is an init block after the main code that sets up memory then
/// jumps to the first line.
pub fn compile(source: &str) -> Result<Program> {
    Compiler::compile(source)
}

struct SourceLine {
    number: Option<u16>,
    row: usize,
    tokens: Vec<Token>,
}

impl SourceLine {
    /// Line number for diagnostics: the BASIC number, else the 1-based row.
    fn id(&self) -> usize {
        self.number.map(|n| n as usize).unwrap_or(self.row)
    }
}

#[derive(Debug, Clone)]
struct Array {
    base: Address,
    dims: Vec<i16>,
    len: usize,
}

enum Target {
    Slot(Slot),
    /// Element address already pushed on the value stack.
    Indexed,
}

struct ForLoop {
    var: String,
    slot: Slot,
    top: Address,
    exit: Address,
    step: Address,
    line: usize,
}

struct WhileLoop {
    top: Address,
    exit: Address,
    line: usize,
}

enum DataItem {
    Number(Val),
    Text(String),
}

struct Compiler {
    program: Program,
    tokens: Vec<Token>,
    pos: usize,
    line_number: usize,
    env: Environment,
    arrays: HashMap<String, Array>,
    functions: HashMap<String, usize>,
    fors: Vec<ForLoop>,
    whiles: Vec<WhileLoop>,
    pending: Vec<(Address, String, usize)>,
    strings: HashMap<String, Address>,
    string_cells: Vec<(Address, String)>,
    data: Vec<Val>,
}

impl Compiler {
    fn compile(source: &str) -> Result<Program> {
        let mut lines = vec![];
        for (index, text) in source.lines().enumerate() {
            let (number, tokens) = lex(text).map_err(|e| e.in_line_number(index + 1))?;
            if number.is_none() && tokens.is_empty() {
                continue;
            }
            lines.push(SourceLine {
                number,
                row: index + 1,
                tokens,
            });
        }
        let data = Compiler::scan_data(&lines)?;
        let functions = Compiler::scan_functions(&lines)?;
        let mut this = Compiler {
            program: Program::new(),
            tokens: vec![],
            pos: 0,
            line_number: 0,
            env: Environment::new(DATA_BASE + data.len()),
            arrays: HashMap::new(),
            functions,
            fors: vec![],
            whiles: vec![],
            pending: vec![],
            strings: HashMap::new(),
            string_cells: vec![],
            data: vec![],
        };
        for item in data {
            let val = match item {
                DataItem::Number(val) => val,
                DataItem::Text(s) => Val::Pointer(this.string(&s)),
            };
            this.data.push(val);
        }
        for line in lines {
            this.line_number = line.id();
            if let Some(number) = line.number {
                let label = number.to_string();
                if this.program.labels().contains_key(&label) {
                    return Err(error!(SyntaxError, this.line_number; "DUPLICATE LINE NUMBER"));
                }
                this.program.add_label(label, this.program.len());
            }
            this.tokens = line.tokens;
            this.pos = 0;
            let line_number = this.line_number;
            this.source_line()
                .map_err(|e| e.in_line_number(line_number))?;
        }
        this.finish()
    }

    fn scan_data(lines: &[SourceLine]) -> Result<Vec<DataItem>> {
        let mut items = vec![];
        for line in lines {
            let tokens = &line.tokens;
            let mut start = true;
            let mut i = 0;
            while i < tokens.len() {
                if start && tokens[i] == Token::Word(Word::Data) {
                    i += 1;
                    loop {
                        let negative = tokens.get(i) == Some(&Token::Operator(Operator::Minus));
                        if negative {
                            i += 1;
                        }
                        let item = match (tokens.get(i), negative) {
                            (Some(Token::Integer(n)), true) => DataItem::Number(Val::Integer(-n)),
                            (Some(Token::Integer(n)), false) => DataItem::Number(Val::Integer(*n)),
                            (Some(Token::Float(n)), true) => DataItem::Number(Val::Float(-n)),
                            (Some(Token::Float(n)), false) => DataItem::Number(Val::Float(*n)),
                            (Some(Token::String(s)), false) | (Some(Token::Ident(s)), false) => {
                                DataItem::Text(s.clone())
                            }
                            _ => return Err(error!(SyntaxError, line.id(); "BAD DATA")),
                        };
                        items.push(item);
                        i += 1;
                        if tokens.get(i) == Some(&Token::Comma) {
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    start = false;
                    continue;
                }
                start = matches!(
                    tokens[i],
                    Token::Colon | Token::Semicolon | Token::Word(Word::Then) | Token::Word(Word::Else)
                );
                i += 1;
            }
        }
        if items.len() > i16::MAX as usize {
            return Err(error!(OutOfMemory; "TOO MUCH DATA"));
        }
        Ok(items)
    }

    /// Names and arity of every `DEF FN`, so calls may precede definitions.
    fn scan_functions(lines: &[SourceLine]) -> Result<HashMap<String, usize>> {
        let mut functions = HashMap::new();
        for line in lines {
            let tokens = &line.tokens;
            for i in 0..tokens.len() {
                if tokens[i] != Token::Word(Word::Def) {
                    continue;
                }
                let name = match (tokens.get(i + 1), tokens.get(i + 2)) {
                    (Some(Token::Word(Word::Fn)), Some(Token::Ident(name))) => name.clone(),
                    _ => return Err(error!(SyntaxError, line.id(); "EXPECTED FN NAME")),
                };
                let mut arity = 0;
                if tokens.get(i + 3) == Some(&Token::LParen) {
                    arity = tokens[i + 4..]
                        .iter()
                        .take_while(|t| **t != Token::RParen)
                        .filter(|t| matches!(t, Token::Ident(_)))
                        .count();
                }
                if functions.insert(name, arity).is_some() {
                    return Err(error!(SyntaxError, line.id(); "DUPLICATE FUNCTION"));
                }
            }
        }
        Ok(functions)
    }

    fn finish(mut self) -> Result<Program> {
        if let Some(f) = self.fors.first() {
            return Err(error!(ForWithoutNext, f.line));
        }
        if let Some(w) = self.whiles.first() {
            return Err(error!(WhileWithoutWend, w.line));
        }
        self.program.add(Opcode::Halt);

        let init = self.here();
        self.program.add_pointer(Opcode::PushP, 0);
        self.program.add_pointer(Opcode::Store, FP_CELL);
        self.program.add_short(Opcode::PushI, 0);
        self.program.add_pointer(Opcode::Store, DATA_CURSOR);
        let end = self.env.high_water();
        let mut at = DATA_BASE + self.data.len();
        while at < end {
            let n = (end - at).min(i16::MAX as usize);
            self.program.add_pointer(Opcode::SetIdx, at);
            self.program.add_short(Opcode::Clr, n as i16);
            at += n;
        }
        for (addr, text) in std::mem::take(&mut self.string_cells) {
            self.program.add_pointer(Opcode::SetIdx, addr);
            self.program.add_string(Opcode::SetS, &text);
        }
        for (i, val) in self.data.iter().enumerate() {
            self.program.add_value(Opcode::Push, *val);
            self.program.add_pointer(Opcode::Store, DATA_BASE + i);
        }
        self.program.add_short(Opcode::Jmp, 0);

        for (site, label, line) in std::mem::take(&mut self.pending) {
            let target = match self.program.get_label(&label) {
                Ok(addr) => addr,
                Err(_) if label.starts_with("FN:") => {
                    return Err(error!(UndefinedUserFunction, line; label[3..].to_string()))
                }
                Err(_) => return Err(error!(UndefinedLine, line; label)),
            };
            self.patch(site, target)?;
        }
        if self.program.len() > MAX_CODE {
            return Err(error!(OutOfMemory; "PROGRAM TOO LARGE"));
        }
        self.program.set_entry(init);
        self.program.set_static_size(end);
        Ok(self.program)
    }

    fn here(&self) -> Address {
        self.program.len()
    }

    fn patch(&mut self, site: Address, target: Address) -> Result<()> {
        if target >= MAX_CODE {
            return Err(error!(OutOfMemory; "PROGRAM TOO LARGE"));
        }
        self.program.update_short(site, target as u16 as i16)
    }

    fn jump_back(&mut self, op: Opcode, target: Address) {
        self.program.add_short(op, target as u16 as i16);
    }

    /// Constant string in static memory, shared by identical literals.
    fn string(&mut self, s: &str) -> Address {
        if let Some(addr) = self.strings.get(s) {
            return *addr;
        }
        let len = s.bytes().filter(|b| *b != 0).count();
        let addr = self.env.allocate(len + 1);
        self.strings.insert(s.to_string(), addr);
        self.string_cells.push((addr, s.to_string()));
        addr
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.accept(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("EXPECTED {}", token)))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        match self.peek() {
            Some(t) => error!(SyntaxError; format!("{} AT {}", expected, t)),
            None => error!(SyntaxError; format!("{} AT END", expected)),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("EXPECTED VARIABLE")),
        }
    }

    fn line_target(&mut self) -> Result<u16> {
        let n = match self.peek() {
            Some(Token::Integer(n)) if *n >= 0 => *n as u16,
            Some(Token::Float(n)) if n.fract() == 0.0 && *n >= 0.0 && *n <= u16::MAX as f32 => {
                *n as u16
            }
            _ => return Err(self.unexpected("EXPECTED LINE NUMBER")),
        };
        self.pos += 1;
        Ok(n)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::Colon) | Some(Token::Semicolon) | Some(Token::Word(Word::Else))
        )
    }

    fn syscall(&mut self, call: Syscall) {
        self.program.add_syscall(call, Register::A);
    }

    fn write_byte(&mut self, byte: u8) {
        self.program.add_short(Opcode::PushI, byte as i16);
        self.program.add(Opcode::PopA);
        self.syscall(Syscall::Write);
    }

    fn source_line(&mut self) -> Result<()> {
        self.statements()?;
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("EXPECTED END OF LINE")),
        }
    }

    /// Statements up to the end of the line or an ELSE.
    fn statements(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                None | Some(Token::Word(Word::Else)) => return Ok(()),
                Some(Token::Colon) | Some(Token::Semicolon) => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            self.statement()?;
            if !self.at_statement_end() {
                return Err(self.unexpected("EXPECTED END OF STATEMENT"));
            }
        }
    }

    fn statement(&mut self) -> Result<()> {
        let word = match self.peek() {
            Some(Token::Ident(_)) => return self.assign(),
            Some(Token::Word(word)) => *word,
            _ => return Err(self.unexpected("EXPECTED STATEMENT")),
        };
        self.pos += 1;
        match word {
            Word::Beep => self.beep(),
            Word::Cls => {
                self.syscall(Syscall::Cls);
                Ok(())
            }
            Word::Color => self.color(),
            Word::Data => {
                while !self.at_statement_end() {
                    self.pos += 1;
                }
                Ok(())
            }
            Word::Def => self.def_fn(),
            Word::Dim => self.dim(),
            Word::End => {
                self.program.add(Opcode::Halt);
                Ok(())
            }
            Word::For => self.for_loop(),
            Word::Gosub => self.jump_to_line(Opcode::Call),
            Word::Goto => self.jump_to_line(Opcode::Jmp),
            Word::If => self.if_then(),
            Word::Input => self.input(),
            Word::Let => self.assign(),
            Word::Line => self.line_draw(),
            Word::Locate => self.args(2, Syscall::Cursor),
            Word::Next => self.next_loop(),
            Word::On => self.on(),
            Word::Poke => self.poke(),
            Word::Print => self.print(),
            Word::Pset => self.pset(),
            Word::Put => self.put(),
            Word::Randomize => self.randomize(),
            Word::Read => self.read(),
            Word::Restore => {
                self.program.add_short(Opcode::PushI, 0);
                self.program.add_pointer(Opcode::Store, DATA_CURSOR);
                Ok(())
            }
            Word::Return => {
                self.program.add(Opcode::Ret);
                Ok(())
            }
            Word::Sound => self.args(3, Syscall::Sound),
            Word::Swap => self.swap(),
            Word::Voice => self.args(7, Syscall::Voice),
            Word::Wait => self.wait(),
            Word::Wend => self.wend(),
            Word::While => self.while_loop(),
            Word::Else | Word::Fn | Word::Rem | Word::Step | Word::Then | Word::To => {
                self.pos -= 1;
                Err(self.unexpected("EXPECTED STATEMENT"))
            }
        }
    }

    /// Pratt parser; code is emitted as each operator is reduced.
    fn expression(&mut self, rbp: u8) -> Result<()> {
        self.prefix()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(op)) if op.lbp() > rbp => *op,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.infix(op)?;
        }
    }

    fn prefix(&mut self) -> Result<()> {
        let token = match self.next_token() {
            Some(token) => token,
            None => return Err(error!(SyntaxError; "EXPECTED EXPRESSION AT END")),
        };
        match token {
            Token::Integer(n) => {
                self.program.add_short(Opcode::PushI, n);
            }
            Token::Float(n) => {
                self.program.add_float(Opcode::PushF, n);
            }
            Token::String(s) => {
                let addr = self.string(&s);
                self.program.add_pointer(Opcode::PushP, addr);
            }
            Token::LParen => {
                self.expression(0)?;
                self.expect(Token::RParen)?;
            }
            Token::Operator(Operator::Minus) => {
                self.program.add_short(Opcode::PushI, 0);
                self.expression(BP_FACTOR)?;
                self.program.add(Opcode::Sub);
            }
            Token::Operator(Operator::Plus) => self.expression(BP_FACTOR)?,
            Token::Operator(Operator::Not) => {
                self.expression(BP_AND)?;
                self.program.add(Opcode::Not);
            }
            Token::Ident(name) => {
                let target = self.target(&name)?;
                self.load(target);
            }
            Token::Builtin(builtin) => self.builtin(builtin)?,
            Token::Word(Word::Fn) => self.call()?,
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("EXPECTED EXPRESSION"));
            }
        }
        Ok(())
    }

    fn infix(&mut self, op: Operator) -> Result<()> {
        use Operator::*;
        let rbp = match op {
            Caret => op.lbp() - 1,
            _ => op.lbp(),
        };
        self.expression(rbp)?;
        let opcode = match op {
            Plus => Opcode::Add,
            Minus => Opcode::Sub,
            Multiply => Opcode::Mul,
            Divide => Opcode::Div,
            DivideInt => Opcode::IDiv,
            Modulus => Opcode::Mod,
            Caret => Opcode::Exp,
            And => Opcode::And,
            Or => Opcode::Or,
            Equal => return Ok(self.relation(0, Opcode::Eq)),
            NotEqual => return Ok(self.relation(0, Opcode::Ne)),
            Less => return Ok(self.relation(-1, Opcode::Eq)),
            Greater => return Ok(self.relation(1, Opcode::Eq)),
            LessEqual => return Ok(self.relation(1, Opcode::Ne)),
            GreaterEqual => return Ok(self.relation(-1, Opcode::Ne)),
            Not => return Err(error!(SyntaxError; "NOT IS NOT A BINARY OPERATOR")),
        };
        self.program.add(opcode);
        Ok(())
    }

    /// CMP accepts mixed numbers, so every BASIC comparison goes through it.
    fn relation(&mut self, k: i16, test: Opcode) {
        self.program.add(Opcode::Cmp);
        self.program.add_short(Opcode::PushI, k);
        self.program.add(test);
    }

    fn builtin(&mut self, builtin: Builtin) -> Result<()> {
        let mut count = 0;
        if self.accept(&Token::LParen) {
            if !self.accept(&Token::RParen) {
                loop {
                    self.expression(0)?;
                    count += 1;
                    if !self.accept(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
            }
        } else if builtin == Builtin::Rnd {
            self.program.add_short(Opcode::PushI, 1);
            count = 1;
        }
        if count != builtin.arity() {
            return Err(error!(IllegalFunctionCall; format!("{} TAKES {}", builtin.name(), builtin.arity())));
        }
        builtin.emit(&mut self.program);
        Ok(())
    }

    fn call(&mut self) -> Result<()> {
        let name = self.ident()?;
        let arity = match self.functions.get(&name) {
            Some(arity) => *arity,
            None => return Err(error!(UndefinedUserFunction; name)),
        };
        let mut count = 0;
        if self.accept(&Token::LParen) && !self.accept(&Token::RParen) {
            loop {
                self.expression(0)?;
                count += 1;
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        if count != arity {
            return Err(error!(IllegalFunctionCall; format!("FN {} TAKES {}", name, arity)));
        }
        let site = self.program.add_short(Opcode::Call, 0);
        self.pending.push((site, format!("FN:{}", name), self.line_number));
        Ok(())
    }

    fn target(&mut self, name: &str) -> Result<Target> {
        if self.peek() == Some(&Token::LParen) {
            self.element(name)
        } else {
            Ok(Target::Slot(self.env.resolve(name)))
        }
    }

    fn load(&mut self, target: Target) {
        match target {
            Target::Slot(Slot::Global(addr)) => {
                self.program.add_pointer(Opcode::Load, addr);
            }
            Target::Slot(Slot::Local(n)) => {
                self.frame();
                self.program.add_short(Opcode::LoadX, n);
            }
            Target::Indexed => {
                self.program.add(Opcode::PopIdx);
                self.program.add(Opcode::LoadI);
            }
        }
    }

    /// Pops the value on top of the stack into `target`.
    fn store(&mut self, target: Target) {
        match target {
            Target::Slot(Slot::Global(addr)) => {
                self.program.add_pointer(Opcode::Store, addr);
            }
            Target::Slot(Slot::Local(n)) => {
                self.frame();
                self.program.add_short(Opcode::StoreX, n);
            }
            Target::Indexed => {
                self.program.add(Opcode::Swap);
                self.program.add(Opcode::PopIdx);
                self.program.add(Opcode::StoreI);
            }
        }
    }

    /// IDX = current frame.
    fn frame(&mut self) {
        self.program.add_pointer(Opcode::SetIdx, FP_CELL);
        self.program.add_short(Opcode::Deref, 0);
    }

    fn dim_array(&mut self, name: &str, dims: Vec<i16>) -> Result<Array> {
        if self.arrays.contains_key(name) {
            return Err(error!(RedimensionedArray; name.to_string()));
        }
        let mut len: usize = 1;
        for dim in &dims {
            if *dim <= 0 {
                return Err(error!(IllegalFunctionCall; "DIMENSION"));
            }
            len *= *dim as usize;
            if len > i16::MAX as usize {
                return Err(error!(OutOfMemory; format!("ARRAY {}", name)));
            }
        }
        let array = Array {
            base: self.env.allocate(len),
            dims,
            len,
        };
        self.arrays.insert(name.to_string(), array.clone());
        Ok(array)
    }

    /// Push the address of `name(i, j, ...)`, row major, bounds checked.
    fn element(&mut self, name: &str) -> Result<Target> {
        self.expect(Token::LParen)?;
        let known = self.arrays.get(name).cloned();
        let mut count = 0;
        loop {
            if count > 0 {
                let dim = match &known {
                    Some(array) => match array.dims.get(count) {
                        Some(dim) => *dim,
                        None => return Err(error!(SubscriptOutOfRange; name.to_string())),
                    },
                    None => IMPLICIT_DIM,
                };
                self.program.add_short(Opcode::PushI, dim);
                self.program.add(Opcode::Mul);
            }
            self.expression(0)?;
            self.program.add(Opcode::Int);
            if count > 0 {
                self.program.add(Opcode::Add);
            }
            count += 1;
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        let array = match known {
            Some(array) if array.dims.len() == count => array,
            Some(_) => return Err(error!(SubscriptOutOfRange; name.to_string())),
            None => self.dim_array(name, vec![IMPLICIT_DIM; count])?,
        };
        self.program.add(Opcode::Dup);
        self.program.add_short(Opcode::PushI, array.len as i16);
        self.relation(-1, Opcode::Eq);
        let too_high = self.program.add_short(Opcode::Jz, 0);
        self.program.add(Opcode::Dup);
        self.program.add_short(Opcode::PushI, 0);
        self.relation(-1, Opcode::Ne);
        let in_range = self.program.add_short(Opcode::Jnz, 0);
        let fail = self
            .program
            .add_short(Opcode::Fail, ErrorCode::SubscriptOutOfRange as i16);
        self.patch(too_high, fail)?;
        let ok = self.here();
        self.patch(in_range, ok)?;
        self.program.add_pointer(Opcode::PushP, array.base);
        self.program.add(Opcode::Add);
        Ok(Target::Indexed)
    }

    fn assign(&mut self) -> Result<()> {
        let name = self.ident()?;
        let target = self.target(&name)?;
        self.expect(Token::Operator(Operator::Equal))?;
        self.expression(0)?;
        self.store(target);
        Ok(())
    }

    fn print(&mut self) -> Result<()> {
        let mut newline = true;
        loop {
            match self.peek() {
                None | Some(Token::Colon) | Some(Token::Word(Word::Else)) => break,
                Some(Token::Semicolon) if self.starts_statement(self.pos + 1) => break,
                Some(Token::Semicolon) => {
                    self.pos += 1;
                    newline = false;
                    continue;
                }
                Some(Token::Comma) => {
                    self.pos += 1;
                    self.write_byte(b'\t');
                    newline = false;
                    continue;
                }
                _ => {}
            }
            self.expression(0)?;
            self.program.add(Opcode::PopA);
            self.syscall(Syscall::Print);
            newline = true;
        }
        if newline {
            self.write_byte(b'\n');
        }
        Ok(())
    }

    /// A keyword at `pos` that cannot begin an expression opens a new
    /// statement, so a `;` before it separates statements.
    fn starts_statement(&self, pos: usize) -> bool {
        match self.tokens.get(pos) {
            Some(Token::Word(word)) => *word != Word::Else && *word != Word::Fn,
            _ => false,
        }
    }

    fn input(&mut self) -> Result<()> {
        let prompt = match self.peek() {
            Some(Token::String(s)) => {
                let s = s.clone();
                self.pos += 1;
                if !self.accept(&Token::Semicolon) {
                    self.expect(Token::Comma)?;
                }
                s
            }
            _ => "? ".to_string(),
        };
        let addr = self.string(&prompt);
        self.program.add_pointer(Opcode::PushP, addr);
        self.program.add(Opcode::PopA);
        self.syscall(Syscall::Puts);
        loop {
            let name = self.ident()?;
            let target = self.target(&name)?;
            if name.ends_with('$') {
                self.syscall(Syscall::Gets);
            } else {
                self.syscall(Syscall::Input);
            }
            self.program.add(Opcode::PushA);
            self.store(target);
            if !self.accept(&Token::Comma) {
                return Ok(());
            }
        }
    }

    fn read(&mut self) -> Result<()> {
        let count = self.data.len() as i16;
        loop {
            let name = self.ident()?;
            let target = self.target(&name)?;
            self.program.add_pointer(Opcode::Load, DATA_CURSOR);
            self.program.add_short(Opcode::PushI, count);
            self.program.add(Opcode::Lt);
            let ok = self.program.add_short(Opcode::Jnz, 0);
            self.program
                .add_short(Opcode::Fail, ErrorCode::OutOfData as i16);
            let here = self.here();
            self.patch(ok, here)?;
            self.program.add_pointer(Opcode::PushP, DATA_BASE);
            self.program.add_pointer(Opcode::Load, DATA_CURSOR);
            self.program.add(Opcode::Add);
            self.program.add(Opcode::PopIdx);
            self.program.add(Opcode::LoadI);
            self.program.add_pointer(Opcode::Load, DATA_CURSOR);
            self.program.add_short(Opcode::PushI, 1);
            self.program.add(Opcode::Add);
            self.program.add_pointer(Opcode::Store, DATA_CURSOR);
            self.store(target);
            if !self.accept(&Token::Comma) {
                return Ok(());
            }
        }
    }

    fn dim(&mut self) -> Result<()> {
        loop {
            let name = self.ident()?;
            self.expect(Token::LParen)?;
            let mut dims = vec![];
            loop {
                match self.peek() {
                    Some(Token::Integer(n)) => {
                        dims.push(*n);
                        self.pos += 1;
                    }
                    _ => return Err(self.unexpected("EXPECTED DIMENSION")),
                }
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
            self.dim_array(&name, dims)?;
            if !self.accept(&Token::Comma) {
                return Ok(());
            }
        }
    }

    fn jump_to_line(&mut self, op: Opcode) -> Result<()> {
        let n = self.line_target()?;
        let site = self.program.add_short(op, 0);
        self.pending.push((site, n.to_string(), self.line_number));
        Ok(())
    }

    fn if_then(&mut self) -> Result<()> {
        self.expression(0)?;
        let to_else = self.program.add_short(Opcode::Jz, 0);
        if self.accept(&Token::Word(Word::Goto)) {
            self.jump_to_line(Opcode::Jmp)?;
        } else {
            self.expect(Token::Word(Word::Then))?;
            self.branch()?;
        }
        if self.accept(&Token::Word(Word::Else)) {
            let to_end = self.program.add_short(Opcode::Jmp, 0);
            let here = self.here();
            self.patch(to_else, here)?;
            self.branch()?;
            let here = self.here();
            self.patch(to_end, here)?;
        } else {
            let here = self.here();
            self.patch(to_else, here)?;
        }
        Ok(())
    }

    fn branch(&mut self) -> Result<()> {
        match self.peek() {
            Some(Token::Integer(_)) | Some(Token::Float(_)) => self.jump_to_line(Opcode::Jmp),
            _ => self.statements(),
        }
    }

    fn while_loop(&mut self) -> Result<()> {
        let top = self.here();
        self.expression(0)?;
        let exit = self.program.add_short(Opcode::Jz, 0);
        self.whiles.push(WhileLoop {
            top,
            exit,
            line: self.line_number,
        });
        Ok(())
    }

    fn wend(&mut self) -> Result<()> {
        let w = match self.whiles.pop() {
            Some(w) => w,
            None => return Err(error!(WendWithoutWhile)),
        };
        self.jump_back(Opcode::Jmp, w.top);
        let here = self.here();
        self.patch(w.exit, here)
    }

    fn for_loop(&mut self) -> Result<()> {
        let var = self.ident()?;
        if self.peek() == Some(&Token::LParen) {
            return Err(self.unexpected("EXPECTED SIMPLE VARIABLE"));
        }
        let slot = self.env.resolve(&var);
        self.expect(Token::Operator(Operator::Equal))?;
        self.expression(0)?;
        self.store(Target::Slot(slot));
        self.expect(Token::Word(Word::To))?;
        let limit = self.env.allocate(1);
        let step = self.env.allocate(1);
        self.expression(0)?;
        self.program.add_pointer(Opcode::Store, limit);
        if self.accept(&Token::Word(Word::Step)) {
            self.expression(0)?;
        } else {
            self.program.add_short(Opcode::PushI, 1);
        }
        self.program.add_pointer(Opcode::Store, step);
        // Done once sgn(var - limit) * sgn(step) is 1.
        let top = self.here();
        self.load(Target::Slot(slot));
        self.program.add_pointer(Opcode::Load, limit);
        self.program.add(Opcode::Cmp);
        self.program.add_pointer(Opcode::Load, step);
        self.program.add_short(Opcode::PushI, 0);
        self.program.add(Opcode::Cmp);
        self.program.add(Opcode::Mul);
        self.program.add_short(Opcode::PushI, 1);
        self.program.add(Opcode::Ne);
        let exit = self.program.add_short(Opcode::Jz, 0);
        self.fors.push(ForLoop {
            var,
            slot,
            top,
            exit,
            step,
            line: self.line_number,
        });
        Ok(())
    }

    fn next_loop(&mut self) -> Result<()> {
        loop {
            let name = match self.peek() {
                Some(Token::Ident(_)) => Some(self.ident()?),
                _ => None,
            };
            let f = match self.fors.pop() {
                Some(f) => f,
                None => return Err(error!(NextWithoutFor)),
            };
            if let Some(name) = &name {
                if *name != f.var {
                    return Err(error!(NextWithoutFor; name.clone()));
                }
            }
            self.load(Target::Slot(f.slot));
            self.program.add_pointer(Opcode::Load, f.step);
            self.program.add(Opcode::Add);
            self.store(Target::Slot(f.slot));
            self.jump_back(Opcode::Jmp, f.top);
            let here = self.here();
            self.patch(f.exit, here)?;
            if name.is_none() || !self.accept(&Token::Comma) {
                return Ok(());
            }
        }
    }

    fn def_fn(&mut self) -> Result<()> {
        self.expect(Token::Word(Word::Fn))?;
        let name = self.ident()?;
        if !self.env.is_root() {
            return Err(error!(SyntaxError; "NESTED DEF FN"));
        }
        let mut params: Vec<String> = vec![];
        if self.accept(&Token::LParen) && !self.accept(&Token::RParen) {
            loop {
                let param = self.ident()?;
                if params.contains(&param) {
                    return Err(error!(SyntaxError; format!("DUPLICATE PARAMETER {}", param)));
                }
                params.push(param);
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        self.expect(Token::Operator(Operator::Equal))?;
        let skip = self.program.add_short(Opcode::Jmp, 0);
        let entry = self.here();
        self.program.add_label(format!("FN:{}", name), entry);

        let root = std::mem::replace(&mut self.env, Environment::new(0));
        self.env = Environment::child(root);
        for param in &params {
            self.env.define(param);
        }
        let n = params.len() as i16;
        let size = self.env.frame_size();
        let frame = self.env.allocate(size);
        self.program.add_pointer(Opcode::SetIdx, frame);
        self.program.add_pointer(Opcode::Load, FP_CELL);
        self.program.add_short(Opcode::StoreX, 0);
        for slot in (1..=n).rev() {
            self.program.add_short(Opcode::StoreX, slot);
        }
        self.program.add(Opcode::PushIdx);
        self.program.add_pointer(Opcode::Store, FP_CELL);
        let body = self.expression(0);
        let child = std::mem::replace(&mut self.env, Environment::new(0));
        self.env = child.into_parent();
        body?;
        self.frame();
        self.program.add_short(Opcode::LoadX, 0);
        self.program.add_pointer(Opcode::Store, FP_CELL);
        self.program.add(Opcode::Ret);
        let here = self.here();
        self.patch(skip, here)
    }

    fn poke(&mut self) -> Result<()> {
        self.expression(0)?;
        self.program.add(Opcode::Ptr);
        self.expect(Token::Comma)?;
        self.expression(0)?;
        self.program.add(Opcode::Swap);
        self.program.add(Opcode::PopIdx);
        self.program.add(Opcode::StoreI);
        Ok(())
    }

    /// `n` comma separated expressions then a syscall that pops them.
    fn args(&mut self, n: usize, call: Syscall) -> Result<()> {
        for i in 0..n {
            if i > 0 {
                self.expect(Token::Comma)?;
            }
            self.expression(0)?;
        }
        self.syscall(call);
        Ok(())
    }

    fn color(&mut self) -> Result<()> {
        self.expression(0)?;
        if self.accept(&Token::Comma) {
            self.expression(0)?;
        } else {
            self.program.add_short(Opcode::PushI, 0);
        }
        self.syscall(Syscall::Colours);
        Ok(())
    }

    fn beep(&mut self) -> Result<()> {
        self.program.add_short(Opcode::PushI, 0);
        self.program.add_short(Opcode::PushI, 800);
        self.program.add_short(Opcode::PushI, 250);
        self.syscall(Syscall::Sound);
        Ok(())
    }

    fn swap(&mut self) -> Result<()> {
        let a = self.ident()?;
        self.expect(Token::Comma)?;
        let b = self.ident()?;
        if self.peek() == Some(&Token::LParen) {
            return Err(self.unexpected("EXPECTED SIMPLE VARIABLE"));
        }
        let a = self.env.resolve(&a);
        let b = self.env.resolve(&b);
        self.load(Target::Slot(a));
        self.load(Target::Slot(b));
        self.store(Target::Slot(a));
        self.store(Target::Slot(b));
        Ok(())
    }

    fn randomize(&mut self) -> Result<()> {
        if self.at_statement_end() {
            self.program.add(Opcode::Clock);
        } else {
            self.expression(0)?;
        }
        self.program.add(Opcode::Seed);
        Ok(())
    }

    /// Give up `n` ticks to the host.
    fn wait(&mut self) -> Result<()> {
        let counter = self.env.allocate(1);
        self.expression(0)?;
        self.program.add_pointer(Opcode::Store, counter);
        let top = self.here();
        self.program.add_pointer(Opcode::Load, counter);
        self.program.add_short(Opcode::PushI, 0);
        self.program.add(Opcode::Cmp);
        self.program.add_short(Opcode::PushI, 1);
        self.program.add(Opcode::Eq);
        let done = self.program.add_short(Opcode::Jz, 0);
        self.program.add(Opcode::Yield);
        self.program.add_pointer(Opcode::Load, counter);
        self.program.add_short(Opcode::PushI, 1);
        self.program.add(Opcode::Sub);
        self.program.add_pointer(Opcode::Store, counter);
        self.jump_back(Opcode::Jmp, top);
        let here = self.here();
        self.patch(done, here)
    }

    fn pset(&mut self) -> Result<()> {
        self.expression(0)?;
        self.expect(Token::Comma)?;
        self.expression(0)?;
        if self.accept(&Token::Comma) {
            self.expression(0)?;
        } else {
            self.program.add_short(Opcode::PushI, DEFAULT_COLOUR);
        }
        self.syscall(Syscall::SetPixel);
        Ok(())
    }

    fn put(&mut self) -> Result<()> {
        self.expression(0)?;
        self.expect(Token::Comma)?;
        self.expression(0)?;
        self.expect(Token::Comma)?;
        let name = self.ident()?;
        let array = match self.arrays.get(&name) {
            Some(array) => array.clone(),
            None => return Err(error!(UndefinedVariable; name)),
        };
        self.program.add_short(Opcode::PushI, array.len as i16);
        self.program.add_pointer(Opcode::PushP, array.base);
        self.program.add(Opcode::PopA);
        self.syscall(Syscall::Blit);
        Ok(())
    }

    fn line_draw(&mut self) -> Result<()> {
        for i in 0..4 {
            if i > 0 {
                self.expect(Token::Comma)?;
            }
            self.expression(0)?;
        }
        let mut call = Syscall::Line;
        if self.accept(&Token::Comma) {
            self.expression(0)?;
            if self.accept(&Token::Comma) {
                match self.ident()? {
                    b if b.eq_ignore_ascii_case("B") => call = Syscall::Box,
                    _ => return Err(error!(SyntaxError; "EXPECTED B")),
                }
            }
        } else {
            self.program.add_short(Opcode::PushI, DEFAULT_COLOUR);
        }
        self.syscall(call);
        Ok(())
    }

    fn on(&mut self) -> Result<()> {
        let selector = self.env.allocate(1);
        self.expression(0)?;
        self.program.add_pointer(Opcode::Store, selector);
        let gosub = if self.accept(&Token::Word(Word::Gosub)) {
            true
        } else {
            self.expect(Token::Word(Word::Goto))?;
            false
        };
        let mut to_end = vec![];
        let mut choice: i16 = 1;
        loop {
            let n = self.line_target()?;
            self.program.add_pointer(Opcode::Load, selector);
            self.program.add_short(Opcode::PushI, choice);
            self.program.add(Opcode::Cmp);
            if gosub {
                let skip = self.program.add_short(Opcode::Jnz, 0);
                let site = self.program.add_short(Opcode::Call, 0);
                self.pending.push((site, n.to_string(), self.line_number));
                to_end.push(self.program.add_short(Opcode::Jmp, 0));
                let here = self.here();
                self.patch(skip, here)?;
            } else {
                let site = self.program.add_short(Opcode::Jz, 0);
                self.pending.push((site, n.to_string(), self.line_number));
            }
            choice += 1;
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        let here = self.here();
        for site in to_end {
            self.patch(site, here)?;
        }
        Ok(())
    }
}
