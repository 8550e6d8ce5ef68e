// src/gen/entry.rs
//! Program entry emission: `init_consts`, the `_STR` formatting helpers and
//! the generated `main`, selected by build mode.

use crate::errors::CompileError;
use crate::prefs::{BuildMode, Preferences};
use crate::table::SymbolTable;

use super::cheaders::STR_BUF_SIZE;
use super::sink::CGenSink;

/// Forward declarations for the string helpers, stitched into the reserved
/// definitions slot so that every function can call them.
pub const STR_HELPER_DECLS: &str = "\
string _STR(const char* fmt, ...);
string _STR_TMP(const char* fmt, ...);
void init_consts();";

pub struct MainEmitter<'a> {
    prefs: &'a Preferences,
    table: &'a SymbolTable,
}

impl<'a> MainEmitter<'a> {
    pub fn new(prefs: &'a Preferences, table: &'a SymbolTable) -> MainEmitter<'a> {
        MainEmitter { prefs, table }
    }

    /// Emit helpers, `init_consts` and the entry point into the sink.
    pub fn emit(&self, sink: &mut CGenSink) -> Result<(), CompileError> {
        self.emit_str_helpers(sink);
        self.emit_init_consts(sink);
        self.emit_entry(sink)
    }

    fn emit_str_helpers(&self, sink: &mut CGenSink) {
        sink.writeln("string _STR(const char* fmt, ...) {");
        sink.writeln("\tva_list ap;");
        sink.writeln("\tva_start(ap, fmt);");
        sink.writeln("\tint len = vsnprintf(0, 0, fmt, ap) + 1;");
        sink.writeln("\tva_end(ap);");
        sink.writeln("\tbyte* buf = malloc(len);");
        sink.writeln("\tva_start(ap, fmt);");
        sink.writeln("\tvsnprintf((char*)buf, len, fmt, ap);");
        sink.writeln("\tva_end(ap);");
        sink.writeln("\treturn tos2(buf);");
        sink.writeln("}");
        sink.writeln("string _STR_TMP(const char* fmt, ...) {");
        sink.writeln("\tva_list ap;");
        sink.writeln("\tva_start(ap, fmt);");
        sink.writeln(format!(
            "\tvsnprintf((char*)g_str_buf, {STR_BUF_SIZE}, fmt, ap);"
        ));
        sink.writeln("\tva_end(ap);");
        sink.writeln("\treturn tos2(g_str_buf);");
        sink.writeln("}");
    }

    fn emit_init_consts(&self, sink: &mut CGenSink) {
        sink.writeln("void init_consts() {");
        sink.writeln(format!("\tg_str_buf = malloc({STR_BUF_SIZE});"));
        if self.prefs.target_os.is_windows_family() {
            // UTF-8 output and ANSI escape processing on the Windows console.
            sink.writeln("\tSetConsoleOutputCP(CP_UTF8);");
            sink.writeln(
                "\tSetConsoleMode(GetStdHandle(STD_OUTPUT_HANDLE), \
                 ENABLE_PROCESSED_OUTPUT | 0x0004);",
            );
        }
        for module in self.table.modules_with_init() {
            sink.writeln(format!("\t{}();", SymbolTable::cname(&module, "init")));
        }
        let init_lines: Vec<String> = sink.consts_init.clone();
        for line in init_lines {
            sink.writeln(format!("\t{line}"));
        }
        sink.writeln("}");
    }

    fn emit_entry(&self, sink: &mut CGenSink) -> Result<(), CompileError> {
        // Libraries and module objects have no entry point.
        if self.prefs.is_so || self.prefs.build_mode == BuildMode::BuildModule {
            return Ok(());
        }
        if self.prefs.is_test {
            return self.emit_test_entry(sink);
        }

        if self.table.find_fn("main__main").is_none() {
            return Err(CompileError::MissingMain);
        }
        sink.writeln("int main(int argc, char** argv) {");
        sink.writeln("\tinit_consts();");
        if self.prefs.is_live {
            sink.writeln("\tv_live_init();");
        }
        sink.writeln("\tmain__main();");
        sink.writeln("\treturn 0;");
        sink.writeln("}");
        Ok(())
    }

    fn emit_test_entry(&self, sink: &mut CGenSink) -> Result<(), CompileError> {
        if self.table.find_fn("main__main").is_some() {
            return Err(CompileError::TestWithMain);
        }
        let tests = self.table.test_fns();
        if tests.is_empty() {
            return Err(CompileError::NoTestFunctions);
        }
        sink.writeln("int main(int argc, char** argv) {");
        sink.writeln("\tinit_consts();");
        for test in tests {
            sink.writeln(format!("\t{}();", test.cname));
        }
        sink.writeln("\tif (g_test_fails > 0) {");
        sink.writeln("\t\treturn 1;");
        sink.writeln("\t}");
        sink.writeln("\tprintf(\"ok\\n\");");
        sink.writeln("\treturn 0;");
        sink.writeln("}");
        Ok(())
    }
}
