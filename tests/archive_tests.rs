//! End-to-end tests for archive inputs.

mod common;

use std::fs;

use common::{archive, bitcode, native_object, stderr, Workspace};
use object::read::archive::ArchiveFile;

#[test]
fn native_members_round_trip_in_extraction_order() {
    let ws = Workspace::new();
    let members = [native_object("one"), native_object("two"), native_object("three")];
    ws.file(
        "libnat.a",
        &archive(&[("one.o", &members[0]), ("two.o", &members[1]), ("three.o", &members[2])]),
    );
    let ar = ws.fake_ar();
    let ar = ar.to_str().unwrap();

    let output = ws.run(["--ar", ar, "libnat.a"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("generating archive: native/libnat.a"));

    let packed = fs::read(ws.path().join("native/libnat.a")).unwrap();
    assert_eq!(packed, members.concat());
    let order = fs::read_to_string(ws.path().join("native/libnat.a.args")).unwrap();
    assert_eq!(order, "one.o\ntwo.o\nthree.o\n");
    assert!(ws.tmp_is_empty());
}

#[test]
fn bitcode_members_are_translated() {
    let ws = Workspace::new();
    let native = native_object("plain");
    let bc = bitcode("lifted", "x86_64-unknown-linux-gnu");
    ws.file("libmix.a", &archive(&[("plain.o", &native), ("lifted.o", &bc)]));
    let ar = ws.fake_ar();
    let ar = ar.to_str().unwrap();

    let output = ws.run(["--ar", ar, "libmix.a"]);
    let log = stderr(&output);
    assert!(output.status.success(), "{log}");
    assert!(log.contains("codegen'ing libmix.a(lifted.o) to"));

    let packed = fs::read(ws.path().join("native/libmix.a")).unwrap();
    assert!(packed.starts_with(&native));
    assert!(packed.len() > native.len());
    assert!(ws.tmp_is_empty());
}

#[test]
fn failing_member_produces_no_archive_and_cleans_up() {
    let ws = Workspace::new();
    let good = native_object("a");
    ws.file("libbad.a", &archive(&[("a.o", &good), ("b.o", b"BC\xC0\xDEjunk")]));
    let ar = ws.fake_ar();
    let ar = ar.to_str().unwrap();

    let output = ws.run(["--ar", ar, "libbad.a"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("libbad.a(b.o)"));
    assert!(!ws.path().join("native/libbad.a").exists());
    assert!(ws.tmp_is_empty());
}

#[test]
fn missing_archiver_is_reported() {
    let ws = Workspace::new();
    ws.file("liba.a", &archive(&[("a.o", &native_object("a"))]));

    let output = ws.run(["--ar", "bc2obj-missing-archiver", "liba.a"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("unable to find 'bc2obj-missing-archiver' in PATH"));
    assert!(ws.tmp_is_empty());
}

#[test]
fn corrupt_archive_fails_without_side_effects() {
    let ws = Workspace::new();
    ws.file("libcorrupt.a", b"not an archive at all");
    ws.file("ok.o", &native_object("ok"));

    let output = ws.run(["libcorrupt.a", "ok.o"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("libcorrupt.a"));
    assert!(ws.path().join("native/ok.o").exists());
    assert!(ws.tmp_is_empty());
}

#[test]
fn real_archiver_output_parses() {
    let ws = Workspace::new();
    let Some(ar) = ["llvm-ar", "ar"]
        .into_iter()
        .find(|name| bc2obj::archive::find_program(name).is_ok())
    else {
        return;
    };
    let members = [native_object("x"), native_object("y")];
    ws.file("libreal.a", &archive(&[("x.o", &members[0]), ("y.o", &members[1])]));

    let output = ws.run(["--ar", ar, "libreal.a"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let packed = fs::read(ws.path().join("native/libreal.a")).unwrap();
    let parsed = ArchiveFile::parse(&*packed).unwrap();
    let contents: Vec<_> = parsed
        .members()
        .map(|member| {
            let member = member.unwrap();
            (member.name().to_vec(), member.data(&*packed).unwrap().to_vec())
        })
        .collect();
    assert_eq!(
        contents,
        vec![
            (b"x.o".to_vec(), members[0].clone()),
            (b"y.o".to_vec(), members[1].clone()),
        ]
    );
}
