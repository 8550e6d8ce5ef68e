// src/table/mod.rs
//! The shared symbol table.
//!
//! One instance per compilation, created by the driver and threaded by
//! mutable reference into every parser. Registration must be idempotent:
//! the decl pass may visit a file again (e.g. when a module is both seeded
//! and imported) and the table contents must come out identical.

use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::backend::flags::CFlag;

/// Import table of a single source file, produced by the imports pass.
#[derive(Clone, Debug)]
pub struct FileImport {
    pub file_path: PathBuf,
    pub module_name: String,
    /// Imported module names, in source order.
    pub imports: SmallVec<[String; 4]>,
}

/// A top-level function collected during the decl pass.
#[derive(Clone, Debug)]
pub struct FnDecl {
    /// Mangled C name (`mod__name`; builtin functions keep their bare name).
    pub cname: String,
    /// Name as written in source.
    pub name: String,
    pub module: String,
    /// V name of the return type, empty for void.
    pub ret_type: String,
    /// C spelling of the return type.
    pub ret_ctype: String,
    /// Parameters as (name, C type), in order.
    pub params_c: Vec<(String, String)>,
    pub arg_count: usize,
    pub is_public: bool,
    /// `fn test_...`, called by the generated test harness.
    pub is_test: bool,
    /// `[live]` attribute: dispatched through a reloadable pointer.
    pub is_live: bool,
    /// `fn C.name(...)`: extern declaration, never emitted.
    pub is_c: bool,
}

/// A struct collected during the decl pass; `def` is the finished C
/// definition text stitched into the reserved definitions slot.
#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub cname: String,
    pub module: String,
    pub def: String,
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub name: String,
    /// Module declares `fn init()`, called from `init_consts`.
    pub has_init: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    pub modules: FxHashMap<String, Module>,
    /// Every module name referenced by an import anywhere in the build.
    pub imports: FxHashSet<String>,
    pub fns: FxHashMap<String, FnDecl>,
    /// Registration order of `fns` keys, for deterministic emission.
    fn_order: Vec<String>,
    pub types: FxHashMap<String, TypeDecl>,
    type_order: Vec<String>,
    /// Constant C name -> V type name.
    consts: FxHashMap<String, String>,
    /// Original name -> obfuscated name.
    pub obf_ids: FxHashMap<String, String>,
    pub file_imports: Vec<FileImport>,
    /// `#flag` directives collected across all files, in source order.
    pub cflags: Vec<CFlag>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// C name for a function: builtin stays bare, everything else is
    /// `module__name`.
    pub fn cname(module: &str, name: &str) -> String {
        if module == "builtin" {
            name.to_string()
        } else {
            format!("{}__{}", module.replace('.', "__"), name)
        }
    }

    pub fn register_module(&mut self, name: &str) {
        self.modules.entry(name.to_string()).or_insert_with(|| Module {
            name: name.to_string(),
            has_init: false,
        });
    }

    pub fn register_import(&mut self, module: &str) {
        self.imports.insert(module.to_string());
    }

    /// Returns true when the function was not registered before.
    pub fn register_fn(&mut self, decl: FnDecl) -> bool {
        if decl.name == "init" && !decl.is_c {
            self.register_module(&decl.module);
            if let Some(m) = self.modules.get_mut(&decl.module) {
                m.has_init = true;
            }
        }
        if self.fns.contains_key(&decl.cname) {
            return false;
        }
        self.fn_order.push(decl.cname.clone());
        self.fns.insert(decl.cname.clone(), decl);
        true
    }

    pub fn find_fn(&self, cname: &str) -> Option<&FnDecl> {
        self.fns.get(cname)
    }

    /// All functions, in registration order.
    pub fn fns_ordered(&self) -> impl Iterator<Item = &FnDecl> {
        self.fn_order.iter().filter_map(|k| self.fns.get(k))
    }

    /// Test functions in registration order, which is build-list order.
    pub fn test_fns(&self) -> Vec<&FnDecl> {
        self.fns_ordered().filter(|f| f.is_test).collect()
    }

    pub fn register_type(&mut self, decl: TypeDecl) {
        if !self.types.contains_key(&decl.cname) {
            self.type_order.push(decl.cname.clone());
            self.types.insert(decl.cname.clone(), decl);
        }
    }

    pub fn types_ordered(&self) -> impl Iterator<Item = &TypeDecl> {
        self.type_order.iter().filter_map(|k| self.types.get(k))
    }

    /// Returns false if the constant was already registered.
    pub fn register_const(&mut self, cname: &str, vtype: &str) -> bool {
        if self.consts.contains_key(cname) {
            return false;
        }
        self.consts.insert(cname.to_string(), vtype.to_string());
        true
    }

    /// V type name of a registered constant.
    pub fn find_const(&self, cname: &str) -> Option<&str> {
        self.consts.get(cname).map(String::as_str)
    }

    /// Obfuscated name for `cname`, assigned on first use.
    pub fn obf_name(&mut self, cname: &str) -> String {
        let next = self.obf_ids.len();
        self.obf_ids
            .entry(cname.to_string())
            .or_insert_with(|| format!("f_{next}"))
            .clone()
    }

    /// Modules with an `init` function, in file-import discovery order.
    pub fn modules_with_init(&self) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for fi in &self.file_imports {
            if seen.insert(fi.module_name.clone())
                && self.modules.get(&fi.module_name).is_some_and(|m| m.has_init)
            {
                out.push(fi.module_name.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a_fn(module: &str, name: &str) -> FnDecl {
        FnDecl {
            cname: SymbolTable::cname(module, name),
            name: name.to_string(),
            module: module.to_string(),
            ret_type: String::new(),
            ret_ctype: "void".to_string(),
            params_c: Vec::new(),
            arg_count: 0,
            is_public: false,
            is_test: name.starts_with("test_"),
            is_live: false,
            is_c: false,
        }
    }

    #[test]
    fn builtin_functions_are_not_mangled() {
        assert_eq!(SymbolTable::cname("builtin", "println"), "println");
        assert_eq!(SymbolTable::cname("main", "main"), "main__main");
        assert_eq!(SymbolTable::cname("net.http", "get"), "net__http__get");
    }

    #[test]
    fn repeated_registration_is_idempotent() {
        let mut table = SymbolTable::new();
        table.register_fn(a_fn("main", "foo"));
        table.register_fn(a_fn("main", "foo"));
        assert_eq!(table.fns_ordered().count(), 1);
    }

    #[test]
    fn test_fns_preserve_order() {
        let mut table = SymbolTable::new();
        table.register_fn(a_fn("main", "test_b"));
        table.register_fn(a_fn("main", "helper"));
        table.register_fn(a_fn("main", "test_a"));
        let names: Vec<_> = table.test_fns().iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, ["test_b", "test_a"]);
    }

    #[test]
    fn obf_names_are_stable_per_symbol() {
        let mut table = SymbolTable::new();
        let first = table.obf_name("main__secret");
        let again = table.obf_name("main__secret");
        let other = table.obf_name("main__other");
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[test]
    fn init_fn_marks_module() {
        let mut table = SymbolTable::new();
        table.register_fn(a_fn("net", "init"));
        assert!(table.modules.get("net").unwrap().has_init);
    }
}
