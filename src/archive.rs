// This module implements the archive pipeline. A static archive is read with the object
// crate's archive parser into ordered (name, bytes) members, nothing is touched on disk
// until that succeeds. Each member then becomes an in-memory job whose output directory is
// its own numbered subdirectory of a private ephemeral directory, so members sharing a name
// never collide. All member jobs share one scheduler group so the archive waits for its own
// members only. When every member succeeded the external archiver is run
// once as `<ar> rcs <out_dir>/<archive name> <member outputs...>`, with the outputs in
// extraction order. The ephemeral directory lives in a guard that removes every member
// output and then the directory itself on every exit path; a failed removal downgrades the
// archive's result.

//! Static archive decomposition and repacking.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use object::read::archive::ArchiveFile;
use tempfile::TempDir;

use crate::core::{resolve_output_path, CompilationTarget, Error, InputUnit, Result};
use crate::job::Job;
use crate::scheduler::JobScheduler;
use crate::worker::worker_task;

/// Whether `path` names a static archive, judged by its `.a` extension.
pub fn is_archive(path: &Path) -> bool {
    path.extension() == Some(OsStr::new("a"))
}

/// Archive members in extraction order.
pub fn read_members(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let data = fs::read(path).map_err(|e| Error::fs("read", path, e))?;
    let invalid = |err: object::Error| Error::InvalidArchive {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    let archive = ArchiveFile::parse(&*data).map_err(invalid)?;
    archive
        .members()
        .map(|member| {
            let member = member.map_err(invalid)?;
            let name = String::from_utf8_lossy(member.name()).into_owned();
            let bytes = member.data(&*data).map_err(invalid)?.to_vec();
            Ok((name, bytes))
        })
        .collect()
}

/// Locate `program` the way the shell would.
///
/// Names containing a path separator are used as given.
pub fn find_program(program: &str) -> Result<PathBuf> {
    find_program_in(program, env::var_os("PATH").as_deref())
}

pub fn find_program_in(program: &str, search_path: Option<&OsStr>) -> Result<PathBuf> {
    let candidate = Path::new(program);
    let found = if candidate.components().count() > 1 {
        is_executable(candidate).then(|| candidate.to_path_buf())
    } else {
        search_path.and_then(|paths| {
            env::split_paths(paths)
                .map(|dir| dir.join(program))
                .find(|path| is_executable(path))
        })
    };
    found.ok_or_else(|| Error::ArchiverNotFound {
        program: program.to_string(),
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Ephemeral directory holding translated members until they are packed.
struct Scratch {
    dir: Option<TempDir>,
    outputs: Vec<PathBuf>,
}

impl Scratch {
    fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bc2obj-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::fs("create temporary directory in", root.unwrap_or(&env::temp_dir()), e))?;
        Ok(Self {
            dir: Some(dir),
            outputs: Vec::new(),
        })
    }

    fn path(&self) -> &Path {
        self.dir.as_ref().map_or(Path::new(""), TempDir::path)
    }

    /// Remove member outputs and the directory; false if anything was left behind.
    fn cleanup(&mut self) -> bool {
        let mut clean = true;
        for output in self.outputs.drain(..) {
            match fs::remove_file(&output) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    log::error!("{}", Error::fs("remove", &output, err));
                    clean = false;
                }
            }
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                log::error!("{}", Error::fs("remove", path, err));
                clean = false;
            }
        }
        clean
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Translates archives member by member and repacks the results.
pub struct ArchivePipeline<'a> {
    exe: &'a Path,
    target: &'a CompilationTarget,
    archiver: &'a str,
    scratch_root: Option<PathBuf>,
}

impl<'a> ArchivePipeline<'a> {
    /// `exe` is the program re-executed for every member.
    pub fn new(exe: &'a Path, target: &'a CompilationTarget, archiver: &'a str) -> Self {
        Self {
            exe,
            target,
            archiver,
            scratch_root: None,
        }
    }

    /// Create ephemeral directories under `root` instead of the system temp directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Translate every member of `archive` and pack them into `out_dir`.
    pub fn process_archive(&self, scheduler: &mut JobScheduler, archive: &Path, out_dir: &Path) -> bool {
        let members = match read_members(archive) {
            Ok(members) => members,
            Err(err) => {
                log::error!("{err}");
                return false;
            }
        };
        let mut scratch = match Scratch::create(self.scratch_root.as_deref()) {
            Ok(scratch) => scratch,
            Err(err) => {
                log::error!("{err}");
                return false;
            }
        };
        log::debug!(
            "{}: {} members, staging in {}",
            archive.display(),
            members.len(),
            scratch.path().display()
        );

        let group = scheduler.group();
        let mut ok = true;
        for (idx, (name, bytes)) in members.into_iter().enumerate() {
            // Members may share a name; each gets its own staging directory.
            let staging = scratch.path().join(idx.to_string());
            let job = Job::new(InputUnit::member(name, bytes), &staging).with_archive(archive);
            let staged = job
                .output_path()
                .and_then(|output| {
                    fs::create_dir(&staging).map_err(|e| Error::fs("create directory", &staging, e))?;
                    Ok(output)
                });
            match staged {
                Ok(output) => scratch.outputs.push(output),
                Err(err) => {
                    log::error!("{}: {err}", job.label());
                    ok = false;
                    continue;
                }
            }
            scheduler.admit(group, worker_task(self.exe, self.target, job));
        }
        ok &= scheduler.drain(group);

        if ok {
            if let Err(err) = self.pack(archive, out_dir, &scratch.outputs) {
                log::error!("{err}");
                ok = false;
            }
        } else {
            log::error!("{}: not generating archive, some members failed", archive.display());
        }

        scratch.cleanup() && ok
    }

    fn pack(&self, archive: &Path, out_dir: &Path, members: &[PathBuf]) -> Result<PathBuf> {
        let program = find_program(self.archiver)?;
        let dest = resolve_output_path(&archive.to_string_lossy(), out_dir)?;
        match fs::remove_file(&dest) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::fs("remove", &dest, err)),
        }

        log::info!("generating archive: {}", dest.display());
        let status = Command::new(&program)
            .arg("rcs")
            .arg(&dest)
            .args(members)
            .status()
            .map_err(|e| Error::fs("run", &program, e))?;
        if !status.success() {
            // Best effort; the archiver failure is what gets reported.
            let _ = fs::remove_file(&dest);
            return Err(Error::Archiver { program, status });
        }
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Stands in for a worker: stores stdin as the member output, fails members named `bad*`.
    const FAKE_WORKER: &str = r#"#!/bin/sh
for arg do
  case "$arg" in
    --out-dir=*) out="${arg#--out-dir=}" ;;
    --member=*) member="${arg#--member=}" ;;
  esac
done
case "$member" in
  bad*) cat >/dev/null; exit 1 ;;
esac
cat > "$out/$member"
"#;

    /// Stands in for `ar rcs`: concatenates the members into the archive.
    const FAKE_AR: &str = r#"#!/bin/sh
[ "$1" = rcs ] || exit 2
out="$2"
shift 2
cat "$@" > "$out"
"#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// GNU-format archive with short member names.
    fn ar_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
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

    struct Fixture {
        _root: tempfile::TempDir,
        tools: PathBuf,
        scratch: PathBuf,
        out: PathBuf,
        archive: PathBuf,
    }

    fn fixture(members: &[(&str, &[u8])]) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let tools = root.path().join("tools");
        let scratch = root.path().join("scratch");
        let out = root.path().join("out");
        for dir in [&tools, &scratch, &out] {
            fs::create_dir(dir).unwrap();
        }
        script(&tools, "worker", FAKE_WORKER);
        script(&tools, "ar", FAKE_AR);
        let archive = root.path().join("libfoo.a");
        fs::write(&archive, ar_bytes(members)).unwrap();
        Fixture {
            _root: root,
            tools,
            scratch,
            out,
            archive,
        }
    }

    fn run(fx: &Fixture) -> bool {
        let exe = fx.tools.join("worker");
        let ar = fx.tools.join("ar");
        let ar = ar.to_string_lossy();
        let target = CompilationTarget::default();
        let pipeline = ArchivePipeline::new(&exe, &target, &ar).with_scratch_root(&fx.scratch);
        let mut scheduler = JobScheduler::new(2);
        let ok = pipeline.process_archive(&mut scheduler, &fx.archive, &fx.out);
        scheduler.drain_all();
        ok
    }

    fn is_empty_dir(dir: &Path) -> bool {
        fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_members_read_in_order() {
        let fx = fixture(&[("a.o", b"first"), ("b.o", b"second!"), ("c.o", b"3")]);
        let members = read_members(&fx.archive).unwrap();
        let names: Vec<_> = members.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a.o", "b.o", "c.o"]);
        assert_eq!(members[1].1, b"second!");
    }

    #[test]
    fn test_round_trip_keeps_extraction_order() {
        let fx = fixture(&[("a.o", b"AAAA"), ("b.o", b"BB"), ("c.o", b"C")]);
        assert!(run(&fx));
        assert_eq!(fs::read(fx.out.join("libfoo.a")).unwrap(), b"AAAABBC");
        assert!(is_empty_dir(&fx.scratch));
    }

    #[test]
    fn test_duplicate_member_names_are_all_packed() {
        let fx = fixture(&[("dup.o", b"FIRST"), ("dup.o", b"SECOND")]);
        assert!(run(&fx));
        assert_eq!(fs::read(fx.out.join("libfoo.a")).unwrap(), b"FIRSTSECOND");
        assert!(is_empty_dir(&fx.scratch));
    }

    #[test]
    fn test_failed_member_skips_archiver() {
        let fx = fixture(&[("a.o", b"AAAA"), ("bad.o", b"BB"), ("c.o", b"C")]);
        assert!(!run(&fx));
        assert!(!fx.out.join("libfoo.a").exists());
        assert!(is_empty_dir(&fx.scratch));
    }

    #[test]
    fn test_stale_output_archive_is_replaced() {
        let fx = fixture(&[("a.o", b"new")]);
        fs::write(fx.out.join("libfoo.a"), b"stale contents").unwrap();
        assert!(run(&fx));
        assert_eq!(fs::read(fx.out.join("libfoo.a")).unwrap(), b"new");
    }

    #[test]
    fn test_corrupt_archive_has_no_side_effects() {
        let fx = fixture(&[]);
        fs::write(&fx.archive, b"this is not an archive").unwrap();
        assert!(!run(&fx));
        assert!(is_empty_dir(&fx.scratch));
        assert!(is_empty_dir(&fx.out));
    }

    #[test]
    fn test_missing_archiver_fails_and_cleans_up() {
        let fx = fixture(&[("a.o", b"AAAA")]);
        let exe = fx.tools.join("worker");
        let target = CompilationTarget::default();
        let pipeline = ArchivePipeline::new(&exe, &target, "bc2obj-no-such-ar").with_scratch_root(&fx.scratch);
        let mut scheduler = JobScheduler::new(1);
        assert!(!pipeline.process_archive(&mut scheduler, &fx.archive, &fx.out));
        assert!(is_empty_dir(&fx.scratch));
    }

    #[test]
    fn test_find_program_searches_path() {
        let dir = tempfile::tempdir().unwrap();
        let ar = script(dir.path(), "my-ar", FAKE_AR);
        fs::write(dir.path().join("not-exec"), "").unwrap();
        let search = env::join_paths([Path::new("/nonexistent"), dir.path()]).unwrap();

        assert_eq!(find_program_in("my-ar", Some(&search)).unwrap(), ar);
        assert!(matches!(
            find_program_in("not-exec", Some(&search)),
            Err(Error::ArchiverNotFound { .. })
        ));
        assert!(find_program_in("my-ar", None).is_err());
        assert_eq!(find_program_in(&ar.to_string_lossy(), None).unwrap(), ar);
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("lib/libfoo.a")));
        assert!(!is_archive(Path::new("foo.bc")));
        assert!(!is_archive(Path::new("foo.a.bc")));
        assert!(!is_archive(Path::new("a")));
    }
}
