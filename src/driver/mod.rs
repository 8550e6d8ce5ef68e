// src/driver/mod.rs
//! The compilation driver.
//!
//! Owns the symbol table and the sink, schedules the three passes over the
//! assembled build list, stitches the reserved definitions slot, emits the
//! entry point (and the live shim), then hands the translation unit to the
//! host C toolchain.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info_span};

use crate::backend::CcInvoker;
use crate::build::BuildAssembler;
use crate::errors::CompileError;
use crate::frontend::{Parser, Pass};
use crate::r#gen::cheaders;
use crate::r#gen::entry::{MainEmitter, STR_HELPER_DECLS};
use crate::r#gen::live::HotReloadEmitter;
use crate::r#gen::CGenSink;
use crate::prefs::Preferences;
use crate::table::SymbolTable;

pub struct Driver {
    prefs: Preferences,
    table: SymbolTable,
    sink: CGenSink,
    input: PathBuf,
}

impl Driver {
    pub fn new(prefs: Preferences, input: impl Into<PathBuf>) -> Driver {
        Driver {
            prefs,
            table: SymbolTable::new(),
            sink: CGenSink::new(),
            input: input.into(),
        }
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    /// Full build: emit the C translation unit, then compile and link it.
    pub fn compile(&mut self) -> Result<(), CompileError> {
        self.emit_c()?;
        if self.prefs.is_live {
            self.build_initial_so()?;
        }
        let invoker = CcInvoker::new(&self.prefs, &self.table.cflags);
        let invocation = invoker.invocation()?;
        invoker.run(&invocation)?;
        Ok(())
    }

    /// Run assembly and all three passes, writing `<out>.tmp.c`.
    pub fn emit_c(&mut self) -> Result<(), CompileError> {
        self.prefs.validate()?;
        if self.prefs.target_os.is_js() {
            return Err(CompileError::InvalidFlag {
                message: "the JavaScript back-end is a stub in this build".into(),
            });
        }

        let files = {
            let _span = info_span!("assemble", input = %self.input.display()).entered();
            let mut assembler =
                BuildAssembler::new(&self.prefs, &mut self.table, &mut self.sink);
            assembler.assemble(&self.input)?
        };
        if self.prefs.is_verbose {
            println!("compiling {} files", files.len());
            for file in &files {
                println!("  {}", file.display());
            }
        }

        self.emit_preamble();

        // Decl pass: collect every top-level symbol before any body runs.
        self.run_pass(Pass::Decl, &files)?;

        // The full symbol set is known; fill the reserved slot.
        let defs = self.definitions_text();
        self.sink.rewrite_definitions(&defs);

        let consts = self.sink.consts.clone();
        for line in consts {
            self.sink.writeln(line);
        }

        // Main pass: per-file code emission, in assembler order.
        self.run_pass(Pass::Main, &files)?;

        MainEmitter::new(&self.prefs, &self.table).emit(&mut self.sink)?;

        if self.prefs.is_live {
            let emitter = HotReloadEmitter::new(
                &self.prefs,
                &self.table,
                self.input.to_string_lossy().into_owned(),
                vexe(),
            );
            emitter.emit(&mut self.sink);
        }

        let out = PathBuf::from(&self.prefs.out_name_c);
        self.sink.save(&out)?;
        debug!(out = %out.display(), "translation unit written");
        Ok(())
    }

    fn run_pass(&mut self, pass: Pass, files: &[PathBuf]) -> Result<(), CompileError> {
        self.sink.pass = pass;
        for file in files {
            let _span = info_span!("parse", file = %file.display(), pass = ?pass).entered();
            let mut parser =
                Parser::from_file(file, pass, &self.prefs, &mut self.table, &mut self.sink)?;
            parser.parse()?;
        }
        Ok(())
    }

    fn emit_preamble(&mut self) {
        for line in cheaders::C_INCLUDES {
            self.sink.include(*line);
        }
        if self.prefs.target_os.is_windows_family() {
            for line in cheaders::C_INCLUDES_WINDOWS {
                self.sink.include(*line);
            }
        }
        self.sink.typedefs.push(cheaders::C_BUILTIN_TYPES.to_string());
        self.sink.writeln(cheaders::C_RUNTIME);
        self.sink.reserve_definitions();
    }

    /// Aggregated definitions: struct bodies, forward signatures, string
    /// helpers, thread argument structs and live bindings.
    fn definitions_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for decl in self.table.types_ordered() {
            parts.push(decl.def.clone());
        }
        parts.extend(self.sink.thread_args.iter().cloned());
        parts.extend(self.sink.fns.iter().cloned());
        parts.push(STR_HELPER_DECLS.to_string());
        if self.prefs.is_live {
            let emitter = HotReloadEmitter::new(
                &self.prefs,
                &self.table,
                self.input.to_string_lossy().into_owned(),
                vexe(),
            );
            parts.push(emitter.definitions(&self.sink.so_fns));
        }
        parts.join("\n")
    }

    /// Live mode links against a shared object that must exist before the
    /// binary starts: build it now by re-invoking this compiler.
    fn build_initial_so(&self) -> Result<(), CompileError> {
        let so_name = self.prefs.live_so_name();
        debug!(so = %so_name, "building initial shared object");
        let status = Command::new(vexe())
            .arg("build")
            .arg("--shared")
            .arg("-o")
            .arg(&so_name)
            .arg(&self.input)
            .status()
            .map_err(|e| CompileError::CompileFailure {
                output: format!("failed to spawn the shared-object build: {e}"),
            })?;
        if !status.success() {
            return Err(CompileError::CompileFailure {
                output: format!("shared-object build failed with {status}"),
            });
        }
        Ok(())
    }
}

/// Path of this compiler's executable, for self-invocation.
fn vexe() -> String {
    std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "v".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{TargetOs, test_prefs};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        _stdlib: TempDir,
        _project: TempDir,
        prefs: Preferences,
        project: PathBuf,
    }

    fn fixture() -> Fixture {
        let stdlib = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::create_dir_all(stdlib.path().join("builtin")).unwrap();
        fs::write(
            stdlib.path().join("builtin/builtin.v"),
            "module builtin\n\nfn C.printf(fmt charptr) int\n\npub fn println(s string) {\n\tC.printf('%.*s\\n', s.len, s.str)\n}\n",
        )
        .unwrap();

        let out = project.path().join("out");
        let mut prefs = test_prefs();
        prefs.stdlib_root = stdlib.path().to_path_buf();
        prefs.dir = project.path().to_path_buf();
        prefs.out_name = out.to_string_lossy().into_owned();
        prefs.out_name_c = format!("{}.tmp.c", out.to_string_lossy());
        let dir = project.path().to_path_buf();
        Fixture {
            _stdlib: stdlib,
            _project: project,
            prefs,
            project: dir,
        }
    }

    fn emit(fx: &Fixture, input: &Path) -> Result<String, CompileError> {
        let mut driver = Driver::new(fx.prefs.clone(), input);
        driver.emit_c()?;
        let text = fs::read_to_string(&fx.prefs.out_name_c).unwrap();
        Ok(text)
    }

    #[test]
    fn hello_world_translation_unit() {
        let fx = fixture();
        fs::write(
            fx.project.join("hello.v"),
            "fn main() {\n\tprintln('hi')\n}\n",
        )
        .unwrap();

        let out = emit(&fx, &fx.project.join("hello.v")).unwrap();
        assert!(out.contains("#include <stdio.h>"));
        assert!(out.contains("void println(string s);"));
        assert!(out.contains("void main__main() {"));
        assert!(out.contains("println(tos2((byte*)\"hi\"));"));
        assert!(out.contains("int main(int argc, char** argv) {"));
        assert!(!out.contains(crate::r#gen::DEFS_MARKER));
    }

    #[test]
    fn emitted_c_is_deterministic() {
        let fx = fixture();
        fs::write(
            fx.project.join("hello.v"),
            "const (\n\tgreeting = 'hello'\n)\nstruct Pair {\n\ta int\n\tb int\n}\nfn main() {\n\tprintln(greeting)\n}\n",
        )
        .unwrap();

        let first = emit(&fx, &fx.project.join("hello.v")).unwrap();
        let second = emit(&fx, &fx.project.join("hello.v")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_c_file_on_import_cycle() {
        let fx = fixture();
        fs::create_dir_all(fx.project.join("m1")).unwrap();
        fs::write(fx.project.join("m1/m1.v"), "module m1\nimport m2\n").unwrap();
        fs::create_dir_all(fx.project.join("m2")).unwrap();
        fs::write(fx.project.join("m2/m2.v"), "module m2\nimport m1\n").unwrap();
        fs::write(fx.project.join("main.v"), "import m1\nfn main() {\n}\n").unwrap();

        let res = emit(&fx, &fx.project.join("main.v"));
        assert!(matches!(res, Err(CompileError::ImportCycle { .. })));
        assert!(!Path::new(&fx.prefs.out_name_c).exists());
    }

    #[test]
    fn missing_main_is_fatal_without_script_mode() {
        let fx = fixture();
        fs::write(fx.project.join("lib.v"), "fn helper() {\n}\n").unwrap();
        let res = emit(&fx, &fx.project.join("lib.v"));
        assert!(matches!(res, Err(CompileError::MissingMain)));
    }

    #[test]
    fn script_mode_synthesises_an_entry() {
        let mut fx = fixture();
        fx.prefs.is_script = true;
        fs::write(fx.project.join("script.v"), "println('hi')\n").unwrap();
        let out = emit(&fx, &fx.project.join("script.v")).unwrap();
        assert!(out.contains("void main__main() {"));
        assert!(out.contains("main__main();"));
    }

    #[test]
    fn platform_filter_selects_target_files() {
        let mut fx = fixture();
        fs::write(
            fx.project.join("a_win.v"),
            "fn on_windows() {\n}\nfn main() {\n\ton_windows()\n}\n",
        )
        .unwrap();
        fs::write(
            fx.project.join("a_lin.v"),
            "fn on_linux() {\n}\nfn main() {\n\ton_linux()\n}\n",
        )
        .unwrap();

        fx.prefs.target_os = TargetOs::Linux;
        let out = emit(&fx, &fx.project).unwrap();
        assert!(out.contains("main__on_linux"));
        assert!(!out.contains("main__on_windows"));
    }

    #[test]
    fn calling_a_filtered_out_function_fails() {
        let mut fx = fixture();
        fs::write(fx.project.join("a_lin.v"), "fn on_linux() {\n}\n").unwrap();
        fs::write(
            fx.project.join("main.v"),
            "fn main() {\n\ton_linux()\n}\n",
        )
        .unwrap();

        fx.prefs.target_os = TargetOs::Linux;
        assert!(emit(&fx, &fx.project).is_ok());

        // Under a Windows target the _lin file is filtered out and the call
        // no longer resolves.
        let mut fx2 = fixture();
        fs::write(fx2.project.join("a_lin.v"), "fn on_linux() {\n}\n").unwrap();
        fs::write(
            fx2.project.join("main.v"),
            "fn main() {\n\ton_linux()\n}\n",
        )
        .unwrap();
        fx2.prefs.target_os = TargetOs::Windows;
        let res = emit(&fx2, &fx2.project);
        match res {
            Err(CompileError::Parse { message, .. }) => {
                assert!(message.contains("undeclared function: on_linux"));
            }
            other => panic!("expected undeclared function, got {other:?}"),
        }
    }

    #[test]
    fn live_build_emits_shim_and_bindings() {
        let mut fx = fixture();
        fx.prefs.is_live = true;
        fs::write(
            fx.project.join("game.v"),
            "[live]\nfn draw() {\n\tprintln('frame')\n}\nfn main() {\n\tdraw()\n}\n",
        )
        .unwrap();

        let out = emit(&fx, &fx.project.join("game.v")).unwrap();
        assert!(out.contains("(*impl_live_main__draw)"));
        assert!(out.contains("dlsym(live_lib, \"main__draw\")"));
        assert!(out.contains("v_live_init();"));
        // The live binary does not carry the body; the .so build does.
        assert!(!out.contains("println(tos2((byte*)\"frame\"))"));
    }

    #[test]
    fn js_target_is_a_stub() {
        let mut fx = fixture();
        fx.prefs.target_os = TargetOs::Js;
        fs::write(fx.project.join("x.v"), "fn main() {\n}\n").unwrap();
        let res = emit(&fx, &fx.project.join("x.v"));
        assert!(matches!(res, Err(CompileError::InvalidFlag { .. })));
    }

    #[test]
    fn test_mode_collects_test_functions() {
        let mut fx = fixture();
        fx.prefs.is_test = true;
        fs::write(
            fx.project.join("a.v"),
            "fn test_one() {\n\tassert 1 == 1\n}\nfn test_two() {\n\tassert 1 == 2\n}\n",
        )
        .unwrap();

        let out = emit(&fx, &fx.project).unwrap();
        assert!(out.contains("main__test_one();"));
        assert!(out.contains("main__test_two();"));
        assert!(out.contains("test_two: assertion failed"));
        assert!(out.contains("if (g_test_fails > 0) {"));
    }
}
