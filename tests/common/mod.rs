//! Shared fixtures for the bc2obj integration tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use inkwell::context::Context;
use inkwell::targets::TargetTriple;
use object::write;
use object::{Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope};

/// Build a bitcode module defining `i32 name()` for `triple` (empty leaves it unset).
pub fn bitcode(name: &str, triple: &str) -> Vec<u8> {
    let context = Context::create();
    let module = context.create_module(name);
    if !triple.is_empty() {
        module.set_triple(&TargetTriple::create(triple));
    }
    let i32_type = context.i32_type();
    let function = module.add_function(name, i32_type.fn_type(&[], false), None);
    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(function, "entry"));
    builder.build_return(Some(&i32_type.const_int(42, false))).unwrap();
    module.write_bitcode_to_memory().as_slice().to_vec()
}

/// A small x86-64 ELF object defining `name`.
pub fn native_object(name: &str) -> Vec<u8> {
    let mut obj = write::Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    let offset = obj.append_section_data(text, &[0xB8, 0x2A, 0, 0, 0, 0xC3], 16);
    obj.add_symbol(write::Symbol {
        name: name.as_bytes().to_vec(),
        value: offset,
        size: 6,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: write::SymbolSection::Section(text),
        flags: SymbolFlags::None,
    });
    obj.write().unwrap()
}

/// GNU-format static archive; member names must be shorter than 16 bytes.
pub fn archive(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = b"!<arch>\n".to_vec();
    for (name, data) in members {
        let header = format!(
            "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
            format!("{name}/"),
            0,
            0,
            0,
            644,
            data.len()
        );
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        if data.len() % 2 == 1 {
            out.push(b'\n');
        }
    }
    out
}

/// Archiver stand-in: logs its arguments to `<archive>.args` and concatenates the members.
pub const FAKE_AR: &str = r#"#!/bin/sh
[ "$1" = rcs ] || exit 2
out="$2"
shift 2
for member do basename "$member"; done > "$out.args"
cat "$@" > "$out"
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Scratch layout for one bc2obj run.
pub struct Workspace {
    pub root: tempfile::TempDir,
    /// Private TMPDIR for the run, so leftovers can be detected.
    pub tmp: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let tmp = root.path().join("tmp");
        fs::create_dir(&tmp).unwrap();
        Self { root, tmp }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    pub fn fake_ar(&self) -> PathBuf {
        write_script(self.path(), "fake-ar", FAKE_AR)
    }

    /// Run bc2obj in the workspace root.
    pub fn run<I, S>(&self, args: I) -> Output
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new(env!("CARGO_BIN_EXE_bc2obj"))
            .args(args)
            .current_dir(self.path())
            .env("TMPDIR", &self.tmp)
            .env("RUST_LOG", "info")
            .output()
            .unwrap()
    }

    pub fn tmp_is_empty(&self) -> bool {
        fs::read_dir(&self.tmp).unwrap().next().is_none()
    }
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
