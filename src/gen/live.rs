// src/gen/live.rs
//! Hot code reload: the generated shim that watches the source file,
//! rebuilds it as a shared object and rebinds the `[live]` symbols in the
//! running process.
//!
//! Discipline: callers go through wrapper functions that hold the live
//! mutex across the pointer call; the watcher holds it across unload and
//! rebind. The previous temporary object is unlinked only after the next
//! rebind succeeds.

use crate::prefs::Preferences;
use crate::table::{FnDecl, SymbolTable};

use super::sink::CGenSink;

pub struct HotReloadEmitter<'a> {
    prefs: &'a Preferences,
    table: &'a SymbolTable,
    /// The watched source file.
    source_path: String,
    /// This compiler's executable, re-invoked for rebuilds.
    vexe: String,
}

/// Escape a path for inclusion in a C string literal.
fn c_escape(path: &str) -> String {
    path.replace('\\', "\\\\").replace('"', "\\\"")
}

fn param_types(decl: &FnDecl) -> String {
    decl.params_c
        .iter()
        .map(|(_, ctype)| ctype.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

fn param_list(decl: &FnDecl) -> String {
    decl.params_c
        .iter()
        .map(|(name, ctype)| format!("{ctype} {name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn arg_names(decl: &FnDecl) -> String {
    decl.params_c
        .iter()
        .map(|(name, _)| name.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'a> HotReloadEmitter<'a> {
    pub fn new(
        prefs: &'a Preferences,
        table: &'a SymbolTable,
        source_path: impl Into<String>,
        vexe: impl Into<String>,
    ) -> HotReloadEmitter<'a> {
        HotReloadEmitter {
            prefs,
            table,
            source_path: source_path.into(),
            vexe: vexe.into(),
        }
    }

    fn live_decls(&self, so_fns: &[String]) -> Vec<&FnDecl> {
        so_fns
            .iter()
            .filter_map(|cname| self.table.find_fn(cname))
            .collect()
    }

    /// Declarations for the reserved definitions slot: one impl pointer and
    /// one wrapper forward declaration per live function.
    pub fn definitions(&self, so_fns: &[String]) -> String {
        let mut out = String::new();
        for decl in self.live_decls(so_fns) {
            let ret = &decl.ret_ctype;
            let cname = &decl.cname;
            out.push_str(&format!(
                "{ret} (*impl_live_{cname})({}) = 0;\n",
                param_types(decl)
            ));
            out.push_str(&format!("{ret} {cname}({});\n", param_list(decl)));
        }
        out.push_str("int load_so(byteptr path);\n");
        out.push_str("void v_live_init();");
        out
    }

    /// Emit the shim at the end of the translation unit.
    pub fn emit(&self, sink: &mut CGenSink) {
        let so_fns = sink.so_fns.clone();
        if self.prefs.target_os.is_windows_family() {
            self.emit_windows(sink, &so_fns);
        } else {
            self.emit_posix(sink, &so_fns);
        }
    }

    fn tmp_so_pattern(&self) -> String {
        let base = std::path::Path::new(&self.source_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "live".into());
        let ext = if self.prefs.target_os.is_windows_family() {
            "dll"
        } else {
            "so"
        };
        format!(".tmp.%d.{base}.{ext}")
    }

    fn emit_posix(&self, sink: &mut CGenSink, so_fns: &[String]) {
        sink.include("#include <dlfcn.h>");
        sink.include("#include <pthread.h>");
        sink.include("#include <sys/stat.h>");
        sink.include("#include <unistd.h>");

        sink.writeln("static void* live_lib = 0;");
        sink.writeln("static pthread_mutex_t live_fn_mutex = PTHREAD_MUTEX_INITIALIZER;");

        for decl in self.live_decls(so_fns) {
            let ret = &decl.ret_ctype;
            let cname = &decl.cname;
            sink.writeln(format!("{ret} {cname}({}) {{", param_list(decl)));
            sink.writeln("\tpthread_mutex_lock(&live_fn_mutex);");
            if ret == "void" {
                sink.writeln(format!("\timpl_live_{cname}({});", arg_names(decl)));
                sink.writeln("\tpthread_mutex_unlock(&live_fn_mutex);");
            } else {
                sink.writeln(format!(
                    "\t{ret} _res = impl_live_{cname}({});",
                    arg_names(decl)
                ));
                sink.writeln("\tpthread_mutex_unlock(&live_fn_mutex);");
                sink.writeln("\treturn _res;");
            }
            sink.writeln("}");
        }

        sink.writeln("int load_so(byteptr path) {");
        sink.writeln("\tif (live_lib) {");
        sink.writeln("\t\tdlclose(live_lib);");
        sink.writeln("\t}");
        sink.writeln("\tlive_lib = dlopen((char*)path, RTLD_LAZY);");
        sink.writeln("\tif (!live_lib) {");
        sink.writeln("\t\tprintf(\"failed to load %s\\n\", path);");
        sink.writeln("\t\texit(1);");
        sink.writeln("\t}");
        for decl in self.live_decls(so_fns) {
            let ret = &decl.ret_ctype;
            let cname = &decl.cname;
            sink.writeln(format!(
                "\timpl_live_{cname} = ({ret} (*)({})) dlsym(live_lib, \"{cname}\");",
                param_types(decl)
            ));
        }
        sink.writeln("\treturn 1;");
        sink.writeln("}");

        let src = c_escape(&self.source_path);
        let vexe = c_escape(&self.vexe);
        let pattern = self.tmp_so_pattern();
        sink.writeln("void* reload_so(void* arg) {");
        sink.writeln("\tchar new_so_name[512];");
        sink.writeln("\tchar prev_so_name[512];");
        sink.writeln("\tchar cmd[1024];");
        sink.writeln("\ttime_t last_mtime = 0;");
        sink.writeln("\tint gen = 0;");
        sink.writeln("\tprev_so_name[0] = 0;");
        sink.writeln("\twhile (1) {");
        sink.writeln("\t\tstruct stat attr;");
        sink.writeln(format!(
            "\t\tif (stat(\"{src}\", &attr) == 0 && attr.st_mtime != last_mtime) {{"
        ));
        sink.writeln("\t\t\tlast_mtime = attr.st_mtime;");
        sink.writeln("\t\t\tif (gen > 0) {");
        sink.writeln(format!(
            "\t\t\t\tsnprintf(new_so_name, sizeof(new_so_name), \"{pattern}\", gen);"
        ));
        sink.writeln(format!(
            "\t\t\t\tsnprintf(cmd, sizeof(cmd), \"{vexe} build --shared -o %s {src}\", new_so_name);"
        ));
        sink.writeln("\t\t\t\tif (system(cmd) != 0) {");
        sink.writeln("\t\t\t\t\tprintf(\"live rebuild failed\\n\");");
        sink.writeln("\t\t\t\t\tgen++;");
        sink.writeln("\t\t\t\t\tcontinue;");
        sink.writeln("\t\t\t\t}");
        sink.writeln("\t\t\t\tpthread_mutex_lock(&live_fn_mutex);");
        sink.writeln("\t\t\t\tload_so((byteptr)new_so_name);");
        sink.writeln("\t\t\t\tif (prev_so_name[0]) {");
        sink.writeln("\t\t\t\t\tunlink(prev_so_name);");
        sink.writeln("\t\t\t\t}");
        sink.writeln("\t\t\t\tstrcpy(prev_so_name, new_so_name);");
        sink.writeln("\t\t\t\tpthread_mutex_unlock(&live_fn_mutex);");
        sink.writeln("\t\t\t}");
        sink.writeln("\t\t\tgen++;");
        sink.writeln("\t\t}");
        sink.writeln("\t\tusleep(100000);");
        sink.writeln("\t}");
        sink.writeln("\treturn 0;");
        sink.writeln("}");

        let initial = c_escape(&self.prefs.live_so_name());
        sink.writeln("void v_live_init() {");
        sink.writeln(format!("\tload_so((byteptr)\"{initial}\");"));
        sink.writeln("\tpthread_t watcher;");
        sink.writeln("\tpthread_create(&watcher, 0, &reload_so, 0);");
        sink.writeln("}");
    }

    fn emit_windows(&self, sink: &mut CGenSink, so_fns: &[String]) {
        sink.include("#include <sys/stat.h>");

        sink.writeln("static HMODULE live_lib = 0;");
        sink.writeln("static HANDLE live_fn_mutex = 0;");

        for decl in self.live_decls(so_fns) {
            let ret = &decl.ret_ctype;
            let cname = &decl.cname;
            sink.writeln(format!("{ret} {cname}({}) {{", param_list(decl)));
            sink.writeln("\tWaitForSingleObject(live_fn_mutex, INFINITE);");
            if ret == "void" {
                sink.writeln(format!("\timpl_live_{cname}({});", arg_names(decl)));
                sink.writeln("\tReleaseMutex(live_fn_mutex);");
            } else {
                sink.writeln(format!(
                    "\t{ret} _res = impl_live_{cname}({});",
                    arg_names(decl)
                ));
                sink.writeln("\tReleaseMutex(live_fn_mutex);");
                sink.writeln("\treturn _res;");
            }
            sink.writeln("}");
        }

        sink.writeln("int load_so(byteptr path) {");
        sink.writeln("\tif (live_lib) {");
        sink.writeln("\t\tFreeLibrary(live_lib);");
        sink.writeln("\t}");
        sink.writeln("\tlive_lib = LoadLibraryA((char*)path);");
        sink.writeln("\tif (!live_lib) {");
        sink.writeln("\t\tprintf(\"failed to load %s\\n\", path);");
        sink.writeln("\t\texit(1);");
        sink.writeln("\t}");
        for decl in self.live_decls(so_fns) {
            let ret = &decl.ret_ctype;
            let cname = &decl.cname;
            sink.writeln(format!(
                "\timpl_live_{cname} = ({ret} (*)({})) GetProcAddress(live_lib, \"{cname}\");",
                param_types(decl)
            ));
        }
        sink.writeln("\treturn 1;");
        sink.writeln("}");

        let src = c_escape(&self.source_path);
        let vexe = c_escape(&self.vexe);
        let pattern = self.tmp_so_pattern();
        sink.writeln("DWORD WINAPI reload_so(LPVOID arg) {");
        sink.writeln("\tchar new_so_name[512];");
        sink.writeln("\tchar prev_so_name[512];");
        sink.writeln("\tchar cmd[1024];");
        sink.writeln("\ttime_t last_mtime = 0;");
        sink.writeln("\tint gen = 0;");
        sink.writeln("\tprev_so_name[0] = 0;");
        sink.writeln("\twhile (1) {");
        sink.writeln("\t\tstruct _stat attr;");
        sink.writeln(format!(
            "\t\tif (_stat(\"{src}\", &attr) == 0 && attr.st_mtime != last_mtime) {{"
        ));
        sink.writeln("\t\t\tlast_mtime = attr.st_mtime;");
        sink.writeln("\t\t\tif (gen > 0) {");
        sink.writeln(format!(
            "\t\t\t\tsnprintf(new_so_name, sizeof(new_so_name), \"{pattern}\", gen);"
        ));
        sink.writeln(format!(
            "\t\t\t\tsnprintf(cmd, sizeof(cmd), \"{vexe} build --shared -o %s {src}\", new_so_name);"
        ));
        sink.writeln("\t\t\t\tif (system(cmd) != 0) {");
        sink.writeln("\t\t\t\t\tprintf(\"live rebuild failed\\n\");");
        sink.writeln("\t\t\t\t\tgen++;");
        sink.writeln("\t\t\t\t\tcontinue;");
        sink.writeln("\t\t\t\t}");
        sink.writeln("\t\t\t\tWaitForSingleObject(live_fn_mutex, INFINITE);");
        sink.writeln("\t\t\t\tload_so((byteptr)new_so_name);");
        sink.writeln("\t\t\t\tif (prev_so_name[0]) {");
        sink.writeln("\t\t\t\t\tDeleteFileA(prev_so_name);");
        sink.writeln("\t\t\t\t}");
        sink.writeln("\t\t\t\tstrcpy(prev_so_name, new_so_name);");
        sink.writeln("\t\t\t\tReleaseMutex(live_fn_mutex);");
        sink.writeln("\t\t\t}");
        sink.writeln("\t\t\tgen++;");
        sink.writeln("\t\t}");
        sink.writeln("\t\tSleep(100);");
        sink.writeln("\t}");
        sink.writeln("\treturn 0;");
        sink.writeln("}");

        let initial = c_escape(&self.prefs.live_so_name());
        sink.writeln("void v_live_init() {");
        sink.writeln("\tlive_fn_mutex = CreateMutexA(0, 0, 0);");
        sink.writeln(format!("\tload_so((byteptr)\"{initial}\");"));
        sink.writeln("\tCreateThread(0, 0, reload_so, 0, 0, 0);");
        sink.writeln("}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{TargetOs, test_prefs};
    use crate::table::FnDecl;

    fn live_table() -> SymbolTable {
        let mut table = SymbolTable::new();
        table.register_fn(FnDecl {
            cname: "main__draw".into(),
            name: "draw".into(),
            module: "main".into(),
            ret_type: String::new(),
            ret_ctype: "void".into(),
            params_c: vec![("frame".into(), "int".into())],
            arg_count: 1,
            is_public: false,
            is_test: false,
            is_live: true,
            is_c: false,
        });
        table
    }

    fn emit_for(target: TargetOs) -> (String, String) {
        let mut prefs = test_prefs();
        prefs.is_live = true;
        prefs.target_os = target;
        let table = live_table();
        let emitter = HotReloadEmitter::new(&prefs, &table, "game.v", "v");
        let so_fns = vec!["main__draw".to_string()];
        let defs = emitter.definitions(&so_fns);
        let mut sink = CGenSink::new();
        sink.so_fns = so_fns;
        emitter.emit(&mut sink);
        (defs, sink.finalize())
    }

    #[test]
    fn definitions_declare_impl_pointer_and_wrapper() {
        let (defs, _) = emit_for(TargetOs::Linux);
        assert!(defs.contains("void (*impl_live_main__draw)(int) = 0;"));
        assert!(defs.contains("void main__draw(int frame);"));
        assert!(defs.contains("void v_live_init();"));
    }

    #[test]
    fn wrapper_holds_mutex_across_call() {
        let (_, shim) = emit_for(TargetOs::Linux);
        let lock = shim.find("pthread_mutex_lock(&live_fn_mutex);").unwrap();
        let call = shim.find("impl_live_main__draw(frame);").unwrap();
        let unlock = shim.find("pthread_mutex_unlock(&live_fn_mutex);").unwrap();
        assert!(lock < call && call < unlock);
    }

    #[test]
    fn previous_object_is_unlinked_only_after_rebind() {
        let (_, shim) = emit_for(TargetOs::Linux);
        let rebind = shim.find("load_so((byteptr)new_so_name);").unwrap();
        let unlink = shim.find("unlink(prev_so_name);").unwrap();
        assert!(rebind < unlink, "unlink must follow the successful rebind");
    }

    #[test]
    fn temporary_names_are_versioned() {
        let (_, shim) = emit_for(TargetOs::Linux);
        assert!(shim.contains(".tmp.%d.game.so"));
    }

    #[test]
    fn windows_shim_uses_loadlibrary() {
        let (_, shim) = emit_for(TargetOs::Windows);
        assert!(shim.contains("LoadLibraryA((char*)path);"));
        assert!(shim.contains("GetProcAddress(live_lib, \"main__draw\");"));
        assert!(shim.contains("WaitForSingleObject(live_fn_mutex, INFINITE);"));
        assert!(shim.contains("Sleep(100);"));
    }

    #[test]
    fn watcher_rebuilds_with_the_compiler() {
        let (_, shim) = emit_for(TargetOs::Linux);
        assert!(shim.contains("v build --shared -o %s game.v"));
    }
}
