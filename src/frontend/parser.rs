// src/frontend/parser.rs
//! The per-pass parser.
//!
//! One parser instance handles one (file, pass) pair and is then discarded;
//! all state that must survive lives in the shared symbol table and sink.
//! The imports pass reads the header and `#` directives, the decl pass
//! registers top-level symbols, and the main pass emits C text for bodies.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::backend::flags;
use crate::errors::CompileError;
use crate::r#gen::CGenSink;
use crate::prefs::Preferences;
use crate::table::{FileImport, FnDecl, SymbolTable, TypeDecl};

use super::lexer::{Tok, Token, lex};
use super::Pass;

/// Coarse value categories, enough to pick C spellings for operators and
/// the `println` family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VKind {
    Int,
    Float,
    Bool,
    Str,
    Void,
    Other,
}

fn kind_of(vtype: &str) -> VKind {
    match vtype {
        "int" | "i64" | "byte" => VKind::Int,
        "f64" | "f32" => VKind::Float,
        "bool" => VKind::Bool,
        "string" => VKind::Str,
        "" => VKind::Void,
        _ => VKind::Other,
    }
}

pub struct Parser<'a> {
    file: PathBuf,
    toks: Vec<Token>,
    pos: usize,
    pass: Pass,
    pub module_name: String,
    imports: SmallVec<[String; 4]>,
    prefs: &'a Preferences,
    table: &'a mut SymbolTable,
    sink: &'a mut CGenSink,
    /// Locals of the function currently being emitted: name -> V type.
    locals: FxHashMap<String, String>,
    /// Source name of the function being emitted (assert messages).
    cur_fn: String,
    /// Non-zero while emitting arguments of a `C.` call; string literals
    /// lower to plain C literals there.
    c_call_depth: u32,
}

impl<'a> Parser<'a> {
    pub fn from_file(
        file: &Path,
        pass: Pass,
        prefs: &'a Preferences,
        table: &'a mut SymbolTable,
        sink: &'a mut CGenSink,
    ) -> Result<Parser<'a>, CompileError> {
        let src = std::fs::read_to_string(file).map_err(|e| CompileError::io(file, e))?;
        Parser::from_source(&src, file, pass, prefs, table, sink)
    }

    pub fn from_source(
        src: &str,
        file: &Path,
        pass: Pass,
        prefs: &'a Preferences,
        table: &'a mut SymbolTable,
        sink: &'a mut CGenSink,
    ) -> Result<Parser<'a>, CompileError> {
        let toks = lex(src, file)?;
        Ok(Parser {
            file: file.to_path_buf(),
            toks,
            pos: 0,
            pass,
            module_name: "main".to_string(),
            imports: SmallVec::new(),
            prefs,
            table,
            sink,
            locals: FxHashMap::default(),
            cur_fn: String::new(),
            c_call_depth: 0,
        })
    }

    // ---- token plumbing ----

    fn peek(&self) -> &Tok {
        &self.toks[self.pos.min(self.toks.len() - 1)].tok
    }

    fn peek2(&self) -> &Tok {
        &self.toks[(self.pos + 1).min(self.toks.len() - 1)].tok
    }

    fn line(&self) -> usize {
        self.toks[self.pos.min(self.toks.len() - 1)].line
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::Parse {
            file: self.file.clone(),
            line: self.line(),
            message: message.into(),
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), CompileError> {
        if self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn ident(&mut self) -> Result<String, CompileError> {
        match self.bump() {
            Tok::Ident(name) => Ok(name),
            other => Err(self.err(format!("expected identifier, found {other:?}"))),
        }
    }

    fn peek_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Ident(name) if name == kw)
    }

    // ---- entry point ----

    /// Run the configured pass over the whole file.
    pub fn parse(&mut self) -> Result<FileImport, CompileError> {
        self.parse_header()?;
        if self.pass == Pass::Imports {
            self.scan_directives()?;
        } else {
            self.parse_items()?;
        }
        Ok(FileImport {
            file_path: self.file.clone(),
            module_name: self.module_name.clone(),
            imports: self.imports.clone(),
        })
    }

    /// `module` declaration and `import` lines, with `#` directives allowed
    /// in between.
    fn parse_header(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek().clone() {
                Tok::Directive(text) => {
                    self.bump();
                    self.handle_directive(&text)?;
                }
                Tok::Ident(name) if name == "module" => {
                    self.bump();
                    self.module_name = self.ident()?;
                    self.table.register_module(&self.module_name);
                }
                Tok::Ident(name) if name == "import" => {
                    self.bump();
                    let module = self.dotted_name()?;
                    self.table.register_import(&module);
                    if !self.imports.contains(&module) {
                        self.imports.push(module);
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn dotted_name(&mut self) -> Result<String, CompileError> {
        let mut name = self.ident()?;
        while self.peek() == &Tok::Dot {
            self.bump();
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    /// Imports pass: `#flag` directives may sit anywhere in the file.
    fn scan_directives(&mut self) -> Result<(), CompileError> {
        while !self.at_eof() {
            if let Tok::Directive(text) = self.peek().clone() {
                self.bump();
                self.handle_directive(&text)?;
            } else {
                self.bump();
            }
        }
        Ok(())
    }

    fn handle_directive(&mut self, text: &str) -> Result<(), CompileError> {
        if let Some(rest) = text.strip_prefix("flag ") {
            // Collected once, during the imports pass.
            if self.pass == Pass::Imports {
                let flag = flags::parse_directive(rest, &self.file, self.line())?;
                self.table.cflags.push(flag);
            }
        } else if let Some(rest) = text.strip_prefix("include ") {
            if self.pass == Pass::Decl {
                self.sink.include(format!("#include {}", rest.trim()));
            }
        } else if self.pass == Pass::Imports {
            return Err(self.err(format!("unknown directive: #{text}")));
        }
        Ok(())
    }

    // ---- top-level items ----

    fn parse_items(&mut self) -> Result<(), CompileError> {
        let mut is_live = false;
        loop {
            match self.peek().clone() {
                Tok::Eof => return Ok(()),
                Tok::Directive(text) => {
                    self.bump();
                    self.handle_directive(&text)?;
                }
                Tok::LBracket => {
                    self.bump();
                    let attr = self.ident()?;
                    self.expect(&Tok::RBracket, "]")?;
                    if attr == "live" {
                        is_live = true;
                    }
                }
                Tok::Ident(name) if name == "pub" => {
                    self.bump();
                    match self.peek().clone() {
                        Tok::Ident(n) if n == "fn" => {
                            self.parse_fn(true, is_live)?;
                            is_live = false;
                        }
                        Tok::Ident(n) if n == "struct" => self.parse_struct()?,
                        Tok::Ident(n) if n == "const" => self.parse_const_block()?,
                        _ => return Err(self.err("expected fn, struct or const after pub")),
                    }
                }
                Tok::Ident(name) if name == "fn" => {
                    self.parse_fn(false, is_live)?;
                    is_live = false;
                }
                Tok::Ident(name) if name == "struct" => self.parse_struct()?,
                Tok::Ident(name) if name == "const" => self.parse_const_block()?,
                Tok::Ident(name) if name == "module" || name == "import" => {
                    return Err(self.err(format!("`{name}` must appear at the top of the file")));
                }
                _ => return self.parse_script_body(),
            }
        }
    }

    /// Script mode: top-level statements become the body of `main`.
    fn parse_script_body(&mut self) -> Result<(), CompileError> {
        if !self.prefs.is_script || self.module_name != "main" {
            return Err(self.err("bad top-level statement (compile with --script to allow it)"));
        }
        if self.pass == Pass::Decl {
            self.table.register_fn(FnDecl {
                cname: "main__main".to_string(),
                name: "main".to_string(),
                module: "main".to_string(),
                ret_type: String::new(),
                ret_ctype: "void".to_string(),
                params_c: Vec::new(),
                arg_count: 0,
                is_public: false,
                is_test: false,
                is_live: false,
                is_c: false,
            });
            while !self.at_eof() {
                self.bump();
            }
            return Ok(());
        }
        self.cur_fn = "main".to_string();
        self.locals.clear();
        self.sink.writeln("void main__main() {");
        while !self.at_eof() {
            if let Tok::Directive(_) = self.peek() {
                self.bump();
                continue;
            }
            self.parse_stmt()?;
        }
        self.sink.writeln("}");
        Ok(())
    }

    // ---- types ----

    fn type_name(&mut self) -> Result<String, CompileError> {
        self.ident()
    }

    /// C spelling of a V type. Capitalized names are struct types of the
    /// current module.
    fn ctype_of(&self, vtype: &str) -> String {
        match vtype {
            "" => "void".to_string(),
            "int" => "int".to_string(),
            "i64" => "i64".to_string(),
            "byte" => "byte".to_string(),
            "byteptr" => "byteptr".to_string(),
            "charptr" => "charptr".to_string(),
            "voidptr" => "voidptr".to_string(),
            "f64" | "f32" => "double".to_string(),
            "bool" => "bool".to_string(),
            "string" => "string".to_string(),
            name => self.type_cname(name),
        }
    }

    fn type_cname(&self, name: &str) -> String {
        if self.module_name == "builtin" {
            name.to_string()
        } else {
            format!("{}__{}", self.module_name.replace('.', "__"), name)
        }
    }

    // ---- functions ----

    fn parse_fn(&mut self, is_public: bool, is_live: bool) -> Result<(), CompileError> {
        self.bump(); // fn
        let mut name = self.ident()?;
        let mut is_c = false;
        if name == "C" && self.peek() == &Tok::Dot {
            self.bump();
            name = self.ident()?;
            is_c = true;
        }

        self.expect(&Tok::LParen, "(")?;
        let mut params: Vec<(String, String)> = Vec::new();
        while self.peek() != &Tok::RParen {
            if !params.is_empty() {
                self.expect(&Tok::Comma, ",")?;
            }
            let pname = self.ident()?;
            let ptype = self.type_name()?;
            params.push((pname, ptype));
        }
        let rparen_line = self.line();
        self.bump(); // )

        // A return type must sit on the same line as the closing paren,
        // otherwise the next declaration would be swallowed.
        let ret_type = match self.peek() {
            Tok::Ident(_) if self.line() == rparen_line => self.type_name()?,
            _ => String::new(),
        };

        let cname = if is_c {
            name.clone()
        } else {
            SymbolTable::cname(&self.module_name, &name)
        };
        let is_test = name.starts_with("test_");

        if self.pass == Pass::Decl {
            let params_c: Vec<(String, String)> = params
                .iter()
                .map(|(pname, ptype)| (pname.clone(), self.ctype_of(ptype)))
                .collect();
            let is_new = self.table.register_fn(FnDecl {
                cname: cname.clone(),
                name: name.clone(),
                module: self.module_name.clone(),
                ret_type: ret_type.clone(),
                ret_ctype: self.ctype_of(&ret_type),
                params_c,
                arg_count: params.len(),
                is_public,
                is_test,
                is_live,
                is_c,
            });
            if is_new && !is_c {
                if is_live && self.prefs.is_live {
                    // Dispatched through a pointer bound from the shared
                    // object; the pointer declaration is the forward decl.
                    self.sink.so_fns.push(cname.clone());
                } else {
                    let sig = self.fn_signature(&cname, &params, &ret_type);
                    self.sink.fns.push(format!("{sig};"));
                }
            }
            if self.peek() == &Tok::LBrace {
                self.skip_block()?;
            }
            return Ok(());
        }

        // Main pass.
        if is_c {
            return Ok(());
        }
        if is_live && self.prefs.is_live {
            // The body lives in the shared object; nothing to emit here.
            if self.peek() == &Tok::LBrace {
                self.skip_block()?;
            }
            return Ok(());
        }

        self.cur_fn = name;
        self.locals.clear();
        for (pname, ptype) in &params {
            self.locals.insert(pname.clone(), ptype.clone());
        }

        let sig = self.fn_signature(&cname, &params, &ret_type);
        self.sink.writeln(format!("{sig} {{"));
        self.parse_block()?;
        self.sink.writeln("}");
        Ok(())
    }

    fn fn_signature(&mut self, cname: &str, params: &[(String, String)], ret: &str) -> String {
        let ret_c = self.ctype_of(ret);
        let params_c: Vec<String> = params
            .iter()
            .map(|(name, vtype)| format!("{} {}", self.ctype_of(vtype), name))
            .collect();
        let emitted = self.emit_fn_name(cname);
        format!("{ret_c} {emitted}({})", params_c.join(", "))
    }

    /// Name a function is emitted and called by, honoring `-obf`.
    fn emit_fn_name(&mut self, cname: &str) -> String {
        if !self.prefs.obfuscate {
            return cname.to_string();
        }
        match self.table.find_fn(cname) {
            Some(f)
                if f.is_c || f.is_test || f.is_live || f.module == "builtin"
                    || cname == "main__main" =>
            {
                cname.to_string()
            }
            Some(_) => self.table.obf_name(cname),
            None => cname.to_string(),
        }
    }

    fn skip_block(&mut self) -> Result<(), CompileError> {
        self.expect(&Tok::LBrace, "{")?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.bump() {
                Tok::LBrace => depth += 1,
                Tok::RBrace => depth -= 1,
                Tok::Eof => return Err(self.err("unexpected end of file in function body")),
                _ => {}
            }
        }
        Ok(())
    }

    // ---- structs and consts ----

    fn parse_struct(&mut self) -> Result<(), CompileError> {
        self.bump(); // struct
        let name = self.ident()?;
        let cname = self.type_cname(&name);
        self.expect(&Tok::LBrace, "{")?;

        let mut def = format!("struct {cname} {{\n");
        while self.peek() != &Tok::RBrace {
            let fname = self.ident()?;
            let ftype = self.type_name()?;
            def.push_str(&format!("\t{} {};\n", self.ctype_of(&ftype), fname));
        }
        self.bump(); // }
        def.push_str("};");

        if self.pass == Pass::Decl {
            let is_new = !self.table.types.contains_key(&cname);
            self.table.register_type(TypeDecl {
                cname: cname.clone(),
                module: self.module_name.clone(),
                def,
            });
            if is_new {
                self.sink
                    .typedefs
                    .push(format!("typedef struct {cname} {cname};"));
            }
        }
        Ok(())
    }

    fn parse_const_block(&mut self) -> Result<(), CompileError> {
        self.bump(); // const
        self.expect(&Tok::LParen, "(")?;
        while self.peek() != &Tok::RParen {
            let name = self.ident()?;
            self.expect(&Tok::Assign, "=")?;
            let cname = format!("{}__{}", self.module_name.replace('.', "__"), name);

            let (text, vtype) = match self.bump() {
                Tok::Int(text) => (text, "int".to_string()),
                Tok::Float(text) => (text, "f64".to_string()),
                Tok::Str(text) => (text, "string".to_string()),
                Tok::Ident(word) if word == "true" || word == "false" => {
                    (word, "bool".to_string())
                }
                other => {
                    return Err(
                        self.err(format!("constants must be literals, found {other:?}"))
                    );
                }
            };

            if self.pass == Pass::Decl && self.table.register_const(&cname, &vtype) {
                match vtype.as_str() {
                    "string" => {
                        self.sink
                            .consts
                            .push(format!("static string _const_{cname};"));
                        self.sink
                            .consts_init
                            .push(format!("_const_{cname} = tos2((byte*)\"{text}\");"));
                    }
                    _ => {
                        let ctype = self.ctype_of(&vtype);
                        self.sink
                            .consts
                            .push(format!("static {ctype} _const_{cname} = {text};"));
                    }
                }
            }
        }
        self.bump(); // )
        Ok(())
    }

    // ---- statements ----

    fn parse_block(&mut self) -> Result<(), CompileError> {
        while self.peek() != &Tok::RBrace {
            if self.at_eof() {
                return Err(self.err("unexpected end of file in block"));
            }
            self.parse_stmt()?;
        }
        self.bump(); // }
        Ok(())
    }

    fn parse_stmt(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Ident(name) if name == "return" => {
                self.bump();
                if self.peek() == &Tok::RBrace {
                    self.sink.writeln("return;");
                } else {
                    let (text, _) = self.parse_expr()?;
                    self.sink.writeln(format!("return {text};"));
                }
                Ok(())
            }
            Tok::Ident(name) if name == "break" || name == "continue" => {
                self.bump();
                self.sink.writeln(format!("{name};"));
                Ok(())
            }
            Tok::Ident(name) if name == "assert" => {
                self.bump();
                let (cond, _) = self.parse_expr()?;
                self.emit_assert(&cond, line);
                Ok(())
            }
            Tok::Ident(name) if name == "if" => self.parse_if(),
            Tok::Ident(name) if name == "for" => self.parse_for(),
            Tok::Ident(name) if self.peek2() == &Tok::DeclAssign => {
                self.bump();
                self.bump();
                let (text, vtype) = self.parse_expr()?;
                if kind_of(&vtype) == VKind::Void {
                    return Err(self.err(format!("cannot assign a void expression to `{name}`")));
                }
                let ctype = self.ctype_of(&vtype);
                self.locals.insert(name.clone(), vtype);
                self.sink.writeln(format!("{ctype} {name} = {text};"));
                Ok(())
            }
            Tok::Ident(name) if self.peek2() == &Tok::Assign => {
                if !self.locals.contains_key(&name) {
                    return Err(self.err(format!("undeclared variable: {name}")));
                }
                self.bump();
                self.bump();
                let (text, _) = self.parse_expr()?;
                self.sink.writeln(format!("{name} = {text};"));
                Ok(())
            }
            _ => {
                let (text, _) = self.parse_expr()?;
                self.sink.writeln(format!("{text};"));
                Ok(())
            }
        }
    }

    fn emit_assert(&mut self, cond: &str, line: usize) {
        let loc = format!("{}:{}", self.file.display(), line).replace('\\', "\\\\");
        let fname = self.cur_fn.clone();
        self.sink.writeln(format!("if (!({cond})) {{"));
        if self.cur_fn.starts_with("test_") {
            self.sink.writeln("\tg_test_fails++;");
            self.sink.writeln(format!(
                "\tprintf(\"*** FAIL: {loc}: {fname}: assertion failed\\n\");"
            ));
        } else {
            self.sink.writeln(format!(
                "\tprintf(\"{loc}: {fname}: assertion failed\\n\");"
            ));
            self.sink.writeln("\texit(1);");
        }
        self.sink.writeln("}");
    }

    fn parse_if(&mut self) -> Result<(), CompileError> {
        self.bump(); // if
        let (cond, _) = self.parse_expr()?;
        self.sink.writeln(format!("if ({cond}) {{"));
        self.expect(&Tok::LBrace, "{")?;
        self.parse_block()?;
        self.sink.writeln("}");
        if self.peek_kw("else") {
            self.bump();
            if self.peek_kw("if") {
                self.sink.writeln("else");
                return self.parse_if();
            }
            self.sink.writeln("else {");
            self.expect(&Tok::LBrace, "{")?;
            self.parse_block()?;
            self.sink.writeln("}");
        }
        Ok(())
    }

    fn parse_for(&mut self) -> Result<(), CompileError> {
        self.bump(); // for
        if self.peek() == &Tok::LBrace {
            self.sink.writeln("while (1) {");
        } else {
            let (cond, _) = self.parse_expr()?;
            self.sink.writeln(format!("while ({cond}) {{"));
        }
        self.expect(&Tok::LBrace, "{")?;
        self.parse_block()?;
        self.sink.writeln("}");
        Ok(())
    }

    // ---- expressions ----
    // Precedence: || -> && -> comparison -> additive -> multiplicative
    // -> unary -> postfix -> primary. Every level returns the emitted C
    // text plus the V type name.

    fn parse_expr(&mut self) -> Result<(String, String), CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<(String, String), CompileError> {
        let (mut text, mut vtype) = self.parse_and()?;
        while self.peek() == &Tok::OrOr {
            self.bump();
            let (rhs, _) = self.parse_and()?;
            text = format!("{text} || {rhs}");
            vtype = "bool".to_string();
        }
        Ok((text, vtype))
    }

    fn parse_and(&mut self) -> Result<(String, String), CompileError> {
        let (mut text, mut vtype) = self.parse_cmp()?;
        while self.peek() == &Tok::AndAnd {
            self.bump();
            let (rhs, _) = self.parse_cmp()?;
            text = format!("{text} && {rhs}");
            vtype = "bool".to_string();
        }
        Ok((text, vtype))
    }

    fn parse_cmp(&mut self) -> Result<(String, String), CompileError> {
        let (mut text, mut vtype) = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Tok::Eq => "==",
                Tok::Ne => "!=",
                Tok::Lt => "<",
                Tok::Gt => ">",
                Tok::Le => "<=",
                Tok::Ge => ">=",
                _ => break,
            };
            self.bump();
            let (rhs, rtype) = self.parse_add()?;
            let strings = kind_of(&vtype) == VKind::Str && kind_of(&rtype) == VKind::Str;
            text = match (op, strings) {
                ("==", true) => format!("string_eq({text}, {rhs})"),
                ("!=", true) => format!("!string_eq({text}, {rhs})"),
                _ => format!("{text} {op} {rhs}"),
            };
            vtype = "bool".to_string();
        }
        Ok((text, vtype))
    }

    fn parse_add(&mut self) -> Result<(String, String), CompileError> {
        let (mut text, mut vtype) = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => "+",
                Tok::Minus => "-",
                _ => break,
            };
            self.bump();
            let (rhs, rtype) = self.parse_mul()?;
            if op == "+" && kind_of(&vtype) == VKind::Str && kind_of(&rtype) == VKind::Str {
                text = format!("string_add({text}, {rhs})");
                vtype = "string".to_string();
            } else {
                text = format!("{text} {op} {rhs}");
                if kind_of(&vtype) != VKind::Float && kind_of(&rtype) == VKind::Float {
                    vtype = "f64".to_string();
                }
            }
        }
        Ok((text, vtype))
    }

    fn parse_mul(&mut self) -> Result<(String, String), CompileError> {
        let (mut text, mut vtype) = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => "*",
                Tok::Slash => "/",
                Tok::Percent => "%",
                _ => break,
            };
            self.bump();
            let (rhs, rtype) = self.parse_unary()?;
            text = format!("{text} {op} {rhs}");
            if kind_of(&vtype) != VKind::Float && kind_of(&rtype) == VKind::Float {
                vtype = "f64".to_string();
            }
        }
        Ok((text, vtype))
    }

    fn parse_unary(&mut self) -> Result<(String, String), CompileError> {
        match self.peek() {
            Tok::Minus => {
                self.bump();
                let (text, vtype) = self.parse_unary()?;
                Ok((format!("-{text}"), vtype))
            }
            Tok::Not => {
                self.bump();
                let (text, _) = self.parse_unary()?;
                Ok((format!("!{text}"), "bool".to_string()))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<(String, String), CompileError> {
        let (mut text, mut vtype) = self.parse_primary()?;
        while self.peek() == &Tok::Dot {
            self.bump();
            let member = self.ident()?;
            // The string type exposes `len` and `str`.
            let mtype = match (kind_of(&vtype), member.as_str()) {
                (VKind::Str, "len") => "int".to_string(),
                (VKind::Str, "str") => "byteptr".to_string(),
                _ => String::from("int"),
            };
            text = format!("{text}.{member}");
            vtype = mtype;
        }
        Ok((text, vtype))
    }

    fn parse_primary(&mut self) -> Result<(String, String), CompileError> {
        match self.bump() {
            Tok::Int(text) => Ok((text, "int".to_string())),
            Tok::Float(text) => Ok((text, "f64".to_string())),
            Tok::Str(text) => self.string_literal(&text),
            Tok::LParen => {
                let (text, vtype) = self.parse_expr()?;
                self.expect(&Tok::RParen, ")")?;
                Ok((format!("({text})"), vtype))
            }
            Tok::Ident(name) if name == "true" || name == "false" => {
                Ok((name, "bool".to_string()))
            }
            Tok::Ident(name) => self.parse_ident_expr(name),
            other => Err(self.err(format!("expected expression, found {other:?}"))),
        }
    }

    fn parse_ident_expr(&mut self, name: String) -> Result<(String, String), CompileError> {
        // Plain call.
        if self.peek() == &Tok::LParen {
            return self.parse_call(None, &name);
        }
        // Qualified name: a module (or C) on the left of a dot. Locals win.
        if self.peek() == &Tok::Dot && !self.locals.contains_key(&name) {
            let mut module = name;
            let mut last = String::new();
            while self.peek() == &Tok::Dot {
                self.bump();
                let part = self.ident()?;
                if self.peek() == &Tok::LParen {
                    last = part;
                    break;
                }
                module.push('.');
                module.push_str(&part);
            }
            if last.is_empty() {
                return Err(self.err(format!("undeclared identifier: {module}")));
            }
            return self.parse_call(Some(module), &last);
        }
        // Local variable.
        if let Some(vtype) = self.locals.get(&name) {
            return Ok((name, vtype.clone()));
        }
        // Constant of the current module, then of builtin.
        let local_const = format!("{}__{}", self.module_name.replace('.', "__"), name);
        let builtin_const = format!("builtin__{name}");
        for cname in [local_const, builtin_const] {
            if let Some(vtype) = self.table.find_const(&cname) {
                return Ok((format!("_const_{cname}"), vtype.to_string()));
            }
        }
        Err(self.err(format!("undeclared variable: {name}")))
    }

    fn parse_call(
        &mut self,
        module: Option<String>,
        name: &str,
    ) -> Result<(String, String), CompileError> {
        // `C.name(...)`: trust the extern, emit raw C literals in args.
        if module.as_deref() == Some("C") {
            self.c_call_depth += 1;
            let args = self.parse_call_args();
            self.c_call_depth -= 1;
            let args = args?;
            return Ok((format!("{name}({})", args.join(", ")), "int".to_string()));
        }

        // Compiler-known output builtins.
        if module.is_none() && matches!(name, "println" | "print" | "exit") {
            let args = self.parse_call_args_typed()?;
            if args.len() != 1 {
                return Err(self.err(format!("{name}() takes one argument")));
            }
            let (text, vtype) = &args[0];
            if name == "exit" {
                return Ok((format!("exit({text})"), String::new()));
            }
            let arg = match kind_of(vtype) {
                VKind::Str => text.clone(),
                VKind::Int => format!("int_str({text})"),
                VKind::Float => format!("f64_str({text})"),
                VKind::Bool => format!("bool_str({text})"),
                _ => text.clone(),
            };
            return Ok((format!("{name}({arg})"), String::new()));
        }

        let cname = match &module {
            Some(m) => SymbolTable::cname(m, name),
            None => {
                let local = SymbolTable::cname(&self.module_name, name);
                if self.table.fns.contains_key(&local) {
                    local
                } else {
                    name.to_string()
                }
            }
        };
        let Some(decl) = self.table.find_fn(&cname) else {
            let shown = match &module {
                Some(m) => format!("{m}.{name}"),
                None => name.to_string(),
            };
            return Err(self.err(format!("undeclared function: {shown}")));
        };
        let arg_count = decl.arg_count;
        let ret_type = decl.ret_type.clone();

        let args = self.parse_call_args()?;
        if args.len() != arg_count {
            return Err(self.err(format!(
                "{name}() expects {arg_count} argument(s), got {}",
                args.len()
            )));
        }
        let emitted = self.emit_fn_name(&cname);
        Ok((format!("{emitted}({})", args.join(", ")), ret_type))
    }

    fn parse_call_args(&mut self) -> Result<Vec<String>, CompileError> {
        Ok(self
            .parse_call_args_typed()?
            .into_iter()
            .map(|(text, _)| text)
            .collect())
    }

    fn parse_call_args_typed(&mut self) -> Result<Vec<(String, String)>, CompileError> {
        self.expect(&Tok::LParen, "(")?;
        let mut args = Vec::new();
        while self.peek() != &Tok::RParen {
            if !args.is_empty() {
                self.expect(&Tok::Comma, ",")?;
            }
            args.push(self.parse_expr()?);
        }
        self.bump(); // )
        Ok(args)
    }

    /// Lower a string literal: raw C text inside `C.` calls, `tos2` for
    /// plain strings, `_STR` when the literal interpolates `$idents`.
    fn string_literal(&mut self, text: &str) -> Result<(String, String), CompileError> {
        if self.c_call_depth > 0 {
            return Ok((format!("\"{text}\""), "charptr".to_string()));
        }
        if !text.contains('$') {
            return Ok((format!("tos2((byte*)\"{text}\")"), "string".to_string()));
        }

        let mut fmt = String::new();
        let mut args: Vec<String> = Vec::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                fmt.push(c);
                continue;
            }
            let mut var = String::new();
            while let Some(&n) = chars.peek() {
                if n.is_ascii_alphanumeric() || n == '_' {
                    var.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            if var.is_empty() {
                fmt.push('$');
                continue;
            }
            let Some(vtype) = self.locals.get(&var) else {
                return Err(self.err(format!("undeclared variable in interpolation: {var}")));
            };
            match kind_of(vtype) {
                VKind::Str => {
                    fmt.push_str("%.*s");
                    args.push(format!("{var}.len, {var}.str"));
                }
                VKind::Int => {
                    fmt.push_str("%d");
                    args.push(var);
                }
                VKind::Float => {
                    fmt.push_str("%g");
                    args.push(var);
                }
                VKind::Bool => {
                    fmt.push_str("%d");
                    args.push(var);
                }
                _ => {
                    return Err(
                        self.err(format!("cannot interpolate `{var}` into a string"))
                    );
                }
            }
        }
        if args.is_empty() {
            // `$` appeared but nothing interpolated.
            return Ok((format!("tos2((byte*)\"{fmt}\")"), "string".to_string()));
        }
        Ok((
            format!("_STR(\"{fmt}\", {})", args.join(", ")),
            "string".to_string(),
        ))
    }
}
