// src/build/mod.rs
//! Build-unit assembly.
//!
//! Expands the user's input (a file or a directory) into the full, ordered
//! list of files to compile: builtin sources first, then every transitively
//! imported module in dependency order, then the user's own files.

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::errors::CompileError;
use crate::frontend::{Parser, Pass};
use crate::r#gen::CGenSink;
use crate::module::{DepGraph, resolve_module_path, source_files_in};
use crate::prefs::Preferences;
use crate::table::SymbolTable;

pub struct BuildAssembler<'a> {
    prefs: &'a Preferences,
    table: &'a mut SymbolTable,
    sink: &'a mut CGenSink,
}

impl<'a> BuildAssembler<'a> {
    pub fn new(
        prefs: &'a Preferences,
        table: &'a mut SymbolTable,
        sink: &'a mut CGenSink,
    ) -> BuildAssembler<'a> {
        BuildAssembler { prefs, table, sink }
    }

    /// Produce the ordered build list for `input` (a `.v` file or a
    /// directory of them).
    pub fn assemble(&mut self, input: &Path) -> Result<Vec<PathBuf>, CompileError> {
        self.sink.pass = Pass::Imports;

        // 1. Builtin seed. Always first in the final list.
        let builtin_dir = self.prefs.stdlib_root.join("builtin");
        let builtin_files = if builtin_dir.is_dir() {
            source_files_in(&builtin_dir, self.prefs)?
        } else {
            debug!(dir = %builtin_dir.display(), "stdlib builtin directory not found");
            Vec::new()
        };

        // 2. User files.
        let user_files = self.user_files(input)?;
        if user_files.is_empty() {
            return Err(CompileError::NoInputFiles);
        }

        // 3. Imports pass over builtin + user files.
        let mut module_files: FxHashMap<String, Vec<PathBuf>> = FxHashMap::default();
        let mut user_modules: FxHashSet<String> = FxHashSet::default();
        let mut pending: Vec<String> = Vec::new();

        for file in &builtin_files {
            let fi = self.run_imports_pass(file, Some("builtin"))?;
            queue_imports(&fi, &mut pending);
        }
        module_files.insert("builtin".to_string(), builtin_files.clone());

        for file in &user_files {
            let fi = self.run_imports_pass(file, None)?;
            user_modules.insert(fi.module_name.clone());
            queue_imports(&fi, &mut pending);
        }

        // 4. Resolve imported modules to fixpoint.
        let mut discovered: Vec<String> = Vec::new();
        while let Some(module) = pending.pop() {
            if module_files.contains_key(&module)
                || user_modules.contains(&module)
                || module == self.prefs.module_name
            {
                continue;
            }
            let dir = resolve_module_path(&module, self.prefs)?;
            debug!(module = %module, dir = %dir.display(), "resolved module");
            let files = source_files_in(&dir, self.prefs)?;
            for file in &files {
                let fi = self.run_imports_pass(file, Some(&module))?;
                queue_imports(&fi, &mut pending);
            }
            module_files.insert(module.clone(), files);
            discovered.push(module);
        }

        // 5. Topological order over the module graph.
        let mut graph = DepGraph::new();
        graph.add_node("builtin");
        for fi in &self.table.file_imports {
            graph.add_node(&fi.module_name);
            for import in &fi.imports {
                graph.add_dep(&fi.module_name, import);
            }
        }
        let order = graph.resolve()?;

        // 6. Concatenate: builtin, imported modules in order, user files.
        let mut list: Vec<PathBuf> = Vec::new();
        list.extend(builtin_files);
        for module in &order {
            if module == "builtin"
                || user_modules.contains(module)
                || *module == self.prefs.module_name
            {
                continue;
            }
            if let Some(files) = module_files.get(module) {
                list.extend(files.iter().cloned());
            }
        }
        list.extend(user_files);

        // 7. Dedupe, first position wins.
        let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
        list.retain(|p| seen.insert(p.clone()));

        Ok(list)
    }

    fn user_files(&self, input: &Path) -> Result<Vec<PathBuf>, CompileError> {
        if !input.exists() {
            return Err(CompileError::PathNotFound {
                path: input.to_path_buf(),
            });
        }
        if input.is_file() {
            return Ok(vec![input.to_path_buf()]);
        }
        source_files_in(input, self.prefs)
    }

    /// Run the imports pass over one file, recording its import table.
    /// `module_override` names files discovered through a dotted import,
    /// whose declared module is only the final segment.
    fn run_imports_pass(
        &mut self,
        file: &Path,
        module_override: Option<&str>,
    ) -> Result<crate::table::FileImport, CompileError> {
        let mut parser = Parser::from_file(file, Pass::Imports, self.prefs, self.table, self.sink)?;
        let mut fi = parser.parse()?;
        if let Some(name) = module_override {
            fi.module_name = name.to_string();
        }
        self.table.file_imports.push(fi.clone());
        Ok(fi)
    }
}

fn queue_imports(fi: &crate::table::FileImport, pending: &mut Vec<String>) {
    for import in &fi.imports {
        if !pending.contains(import) {
            pending.push(import.clone());
        }
    }
}
