// src/gen/cheaders.rs
//! The fixed C runtime preamble emitted at the top of every translation
//! unit: headers, the string type, and the small helper set the generated
//! code leans on. Everything else comes from the builtin module sources.

/// Headers every build includes.
pub const C_INCLUDES: &[&str] = &[
    "#include <stdio.h>",
    "#include <stdlib.h>",
    "#include <string.h>",
    "#include <stdarg.h>",
    "#include <stdint.h>",
];

/// Extra headers for Windows-family targets.
pub const C_INCLUDES_WINDOWS: &[&str] = &["#include <windows.h>"];

/// Core typedefs, stitched into the typedef block.
pub const C_BUILTIN_TYPES: &str = "\
typedef int64_t i64;
typedef uint8_t byte;
typedef unsigned char* byteptr;
typedef char* charptr;
typedef void* voidptr;
typedef int bool;
#define true 1
#define false 0
typedef struct string string;
struct string {
\tbyte* str;
\tint len;
};";

/// Runtime helpers available to all generated code.
pub const C_RUNTIME: &str = "\
static byte* g_str_buf;
static int g_test_fails = 0;

string tos2(byte* s) {
\tstring res;
\tres.str = s;
\tres.len = s ? (int)strlen((char*)s) : 0;
\treturn res;
}

bool string_eq(string a, string b) {
\tif (a.len != b.len) return false;
\treturn memcmp(a.str, b.str, a.len) == 0;
}

string string_add(string a, string b) {
\tstring res;
\tres.len = a.len + b.len;
\tres.str = malloc(res.len + 1);
\tmemcpy(res.str, a.str, a.len);
\tmemcpy(res.str + a.len, b.str, b.len);
\tres.str[res.len] = 0;
\treturn res;
}

string int_str(i64 n) {
\tchar* buf = malloc(32);
\tsnprintf(buf, 32, \"%lld\", (long long)n);
\treturn tos2((byte*)buf);
}

string f64_str(double n) {
\tchar* buf = malloc(32);
\tsnprintf(buf, 32, \"%g\", n);
\treturn tos2((byte*)buf);
}

string bool_str(bool b) {
\treturn tos2((byte*)(b ? \"true\" : \"false\"));
}";

/// Size of the scratch buffer backing `_STR_TMP`.
pub const STR_BUF_SIZE: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_declares_the_string_type() {
        assert!(C_BUILTIN_TYPES.contains("typedef struct string string;"));
        assert!(C_RUNTIME.contains("string tos2(byte* s)"));
    }

    #[test]
    fn includes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for line in C_INCLUDES {
            assert!(seen.insert(line), "duplicate include {line}");
        }
    }
}
