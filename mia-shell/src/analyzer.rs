//! Command language front end: one command per line, `#` starts a
//! comment, command names are case-insensitive, flags are `-name=value`
//! (values may be double-quoted) or bare booleans like `-r`.
//!
//! Only `unit`, `fit`, `type`, `fs` values and mount ids are
//! case-normalized; paths travel verbatim.

use std::path::Path;

use mia_fs::fs::mkfs::{mkfs, FsKind};
use mia_fs::fs::{file, journal, users};
use mia_fs::{
    fdisk_add, fdisk_create, fdisk_delete, mkdisk, rmdisk, DeleteMode, Error, Fit, Kernel,
    PartitionKind, Result, Unit, Volume,
};
use typed_bytesize::ByteSizeIec;

use crate::reports;

pub struct Command {
    pub name: String,
    flags: Flags,
}

struct Flags(Vec<(String, Option<String>)>);

/// Parses one input line. Blank lines and comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest),
        None => (line, ""),
    };
    Ok(Some(Command {
        name: name.to_lowercase(),
        flags: Flags(tokenize(rest)?),
    }))
}

fn tokenize(rest: &str) -> Result<Vec<(String, Option<String>)>> {
    let mut flags = Vec::new();
    let mut chars = rest.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&c) = chars.peek() else { break };
        if c != '-' {
            return Err(Error::Validation(format!(
                "flags must start with '-' (unexpected '{c}')"
            )));
        }
        chars.next();

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            return Err(Error::Validation("empty flag name".into()));
        }

        let mut value = None;
        if chars.peek() == Some(&'=') {
            chars.next();
            let mut v = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => v.push(c),
                        None => {
                            return Err(Error::Validation("unterminated quoted value".into()))
                        }
                    }
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    v.push(c);
                    chars.next();
                }
            }
            value = Some(v);
        }
        flags.push((name.to_lowercase(), value));
    }
    Ok(flags)
}

impl Flags {
    fn value(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.value(name)
            .ok_or_else(|| Error::Validation(format!("-{name} is required")))
    }

    /// Bare boolean flag: present without a value (or `=true`).
    fn switch(&self, name: &str) -> bool {
        self.0
            .iter()
            .any(|(n, v)| n == name && v.as_deref().map_or(true, |v| v.eq_ignore_ascii_case("true")))
    }

    fn lower_or(&self, name: &str, default: &str) -> String {
        self.value(name).unwrap_or(default).to_lowercase()
    }

    fn int(&self, name: &str) -> Result<i64> {
        let raw = self.required(name)?;
        raw.parse()
            .map_err(|_| Error::Validation(format!("-{name} must be an integer (got '{raw}')")))
    }

    fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.value(name) {
            Some(raw) => raw.parse().map_err(|_| {
                Error::Validation(format!("-{name} must be an integer (got '{raw}')"))
            }),
            None => Ok(default),
        }
    }
}

/// Executes a parsed command against the kernel and returns the text
/// to print. `exit` is handled by the caller.
pub fn execute(kernel: &mut Kernel, cmd: &Command) -> Result<String> {
    let flags = &cmd.flags;
    match cmd.name.as_str() {
        "mkdisk" => {
            let size = flags.int("size")?;
            let unit = Unit::parse(&flags.lower_or("unit", "m"), false)?;
            let fit = Fit::parse(&flags.lower_or("fit", "ff"))?;
            let path = flags.required("path")?;
            mkdisk(size, fit, unit, Path::new(path))?;
            Ok(format!(
                "disk created: {path} ({})",
                ByteSizeIec((size * unit.scale()) as u64)
            ))
        }
        "rmdisk" => {
            let path = flags.required("path")?;
            rmdisk(kernel, Path::new(path))?;
            Ok(format!("disk removed: {path}"))
        }
        "fdisk" => fdisk(flags),
        "mount" => {
            let path = flags.required("path")?;
            let name = flags.required("name")?;
            let id = kernel.mount(Path::new(path), name)?;
            Ok(format!("partition '{name}' mounted with id {id}"))
        }
        "unmount" => {
            let id = flags.required("id")?.to_uppercase();
            let entry = kernel.unmount(&id)?;
            Ok(format!("partition '{}' unmounted", entry.name))
        }
        "mounted" => Ok(render_mounted(kernel)),
        "mkfs" => {
            let id = flags.required("id")?.to_uppercase();
            let full = flags.lower_or("type", "full") == "full";
            let kind = FsKind::parse(&flags.lower_or("fs", "2fs"))?;
            let report = mkfs(kernel, &id, full, kind)?;
            Ok(format!(
                "{id} formatted as EXT{}: {} inodes, {} blocks",
                if report.kind == FsKind::Ext3 { 3 } else { 2 },
                report.inodes,
                report.blocks
            ))
        }
        "login" => {
            let user = flags.required("user")?;
            let pass = flags.required("pass")?;
            let id = flags.required("id")?.to_uppercase();
            users::login(kernel, user, pass, &id)?;
            Ok(format!("session opened for '{user}' on {id}"))
        }
        "logout" => {
            let session = users::logout(kernel)?;
            Ok(format!("session closed for '{}'", session.username))
        }
        "mkgrp" => {
            let name = flags.required("name")?;
            let id = users::mkgrp(kernel, name)?;
            Ok(format!("group '{name}' created with id {id}"))
        }
        "rmgrp" => {
            let name = flags.required("name")?;
            users::rmgrp(kernel, name)?;
            Ok(format!("group '{name}' removed"))
        }
        "mkusr" => {
            let user = flags.required("user")?;
            let pass = flags.required("pass")?;
            let grp = flags.required("grp")?;
            let id = users::mkusr(kernel, user, pass, grp)?;
            Ok(format!("user '{user}' created with id {id} in group '{grp}'"))
        }
        "rmusr" => {
            let user = flags.required("user")?;
            users::rmusr(kernel, user)?;
            Ok(format!("user '{user}' removed"))
        }
        "chgrp" => {
            let user = flags.required("user")?;
            let grp = flags.required("grp")?;
            users::chgrp(kernel, user, grp)?;
            Ok(format!("user '{user}' is now in group '{grp}'"))
        }
        "mkfile" => {
            let path = flags.required("path")?;
            let size = flags.int_or("size", 0)?;
            let cont = flags.value("cont").map(Path::new);
            file::mkfile(kernel, path, flags.switch("r"), size, cont)?;
            Ok(format!("file created: {path}"))
        }
        "mkdir" => {
            let path = flags.required("path")?;
            file::mkdir(kernel, path, flags.switch("p"))?;
            Ok(format!("directory created: {path}"))
        }
        "cat" => {
            let mut paths: Vec<String> = Vec::new();
            for i in 1..=10 {
                if let Some(p) = flags.value(&format!("file{i}")) {
                    paths.push(p.to_owned());
                }
            }
            if paths.is_empty() {
                paths.push("/users.txt".to_owned());
            }
            let mut out = file::cat(kernel, &paths)?;
            // 内容自带换行，命令输出不再补
            if out.ends_with('\n') {
                out.pop();
            }
            Ok(out)
        }
        "remove" => {
            let path = flags.required("path")?;
            file::remove(kernel, path)?;
            Ok(format!("removed: {path}"))
        }
        "edit" => {
            let path = flags.required("path")?;
            let content = flags.required("contenido")?;
            file::edit(kernel, path, Path::new(content))?;
            Ok(format!("file rewritten: {path}"))
        }
        "rename" => {
            let path = flags.required("path")?;
            let name = flags.required("name")?;
            file::rename(kernel, path, name)?;
            Ok(format!("renamed {path} to '{name}'"))
        }
        "copy" => {
            let path = flags.required("path")?;
            let dest = flags.required("destino")?;
            let stats = file::copy(kernel, path, dest)?;
            let mut out = format!("copied {path} into {dest} ({} entries)", stats.copied);
            if stats.skipped > 0 {
                out.push_str(&format!(", {} unreadable entries skipped", stats.skipped));
            }
            Ok(out)
        }
        "move" => {
            let path = flags.required("path")?;
            let dest = flags.required("destino")?;
            file::mv(kernel, path, dest)?;
            Ok(format!("moved {path} into {dest}"))
        }
        "find" => {
            let path = flags.required("path")?;
            let pattern = flags.required("name")?;
            let hits = file::find(kernel, path, pattern)?;
            if hits.is_empty() {
                Ok(format!("no matches for '{pattern}' under {path}"))
            } else {
                Ok(hits.join("\n"))
            }
        }
        "chown" => {
            let path = flags.required("path")?;
            let user = flags.required("usuario")?;
            file::chown(kernel, path, flags.switch("r"), user)?;
            Ok(format!("owner of {path} set to '{user}'"))
        }
        "chmod" => {
            let path = flags.required("path")?;
            let ugo = flags.required("ugo")?;
            file::chmod(kernel, path, ugo, flags.switch("r"))?;
            Ok(format!("permissions of {path} set to {ugo}"))
        }
        "loss" => {
            let id = flags.required("id")?.to_uppercase();
            journal::loss(kernel, &id)?;
            Ok(format!(
                "metadata of {id} wiped; run 'recovery -id={id}' to restore the baseline"
            ))
        }
        "recovery" => {
            let id = flags.required("id")?.to_uppercase();
            let replayed = journal::recovery(kernel, &id)?;
            Ok(format!(
                "{id} recovered to the mkfs baseline ({replayed} journal entries covered)"
            ))
        }
        "journaling" => {
            let id = flags.required("id")?.to_uppercase();
            render_journal(kernel, &id)
        }
        "rep" => {
            let name = flags.required("name")?.to_lowercase();
            let path = flags.required("path")?;
            let id = flags.required("id")?.to_uppercase();
            let ls_path = flags.value("path_file_ls");
            reports::generate(kernel, &name, Path::new(path), &id, ls_path)
        }
        other => Err(Error::Validation(format!("unknown command '{other}'"))),
    }
}

fn fdisk(flags: &Flags) -> Result<String> {
    let path = flags.required("path")?;
    let name = flags.required("name")?;

    if let Some(mode) = flags.value("delete") {
        let mode = DeleteMode::parse(&mode.to_lowercase())?;
        fdisk_delete(Path::new(path), name, mode)?;
        return Ok(format!("partition '{name}' deleted"));
    }
    if flags.value("add").is_some() {
        let delta = flags.int("add")?;
        let unit = Unit::parse(&flags.lower_or("unit", "k"), true)?;
        fdisk_add(Path::new(path), name, delta * unit.scale())?;
        return Ok(format!("partition '{name}' resized"));
    }

    let size = flags.int("size")?;
    let unit = Unit::parse(&flags.lower_or("unit", "k"), true)?;
    let kind = PartitionKind::parse(&flags.lower_or("type", "p"))?;
    let fit = Fit::parse(&flags.lower_or("fit", "wf"))?;
    fdisk_create(size, Path::new(path), name, kind, fit, unit)?;
    Ok(format!(
        "partition '{name}' created ({})",
        ByteSizeIec((size * unit.scale()) as u64)
    ))
}

fn render_mounted(kernel: &Kernel) -> String {
    let mut rows: Vec<String> = kernel
        .mounted()
        .map(|m| {
            let kind = match m.kind {
                mia_fs::MountKind::Primary { .. } => "primary",
                mia_fs::MountKind::Logical { .. } => "logical",
            };
            format!("{:<6} {:<16} {:<8} {}", m.id, m.name, kind, m.path.display())
        })
        .collect();
    if rows.is_empty() {
        return "no partitions are mounted".into();
    }
    rows.insert(
        0,
        format!("{:<6} {:<16} {:<8} {}", "id", "partition", "type", "disk"),
    );
    rows.join("\n")
}

fn render_journal(kernel: &Kernel, id: &str) -> Result<String> {
    let mount = kernel.mount_entry(id)?.clone();
    let vol = Volume::open(&mount)?;
    let entries = journal::entries(&vol)?;
    if entries.is_empty() {
        return Ok(format!("the journal of {id} is empty"));
    }
    let mut rows = vec![format!(
        "{:<4} {:<10} {:<32} {:<20} {}",
        "#", "operation", "path", "content", "date"
    )];
    for (i, entry) in entries.iter().enumerate() {
        rows.push(format!(
            "{:<4} {:<10} {:<32} {:<20} {}",
            i + 1,
            entry.operation(),
            entry.path(),
            entry.content_text(),
            entry.date as i64
        ));
    }
    Ok(rows.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::parse;

    #[test]
    fn comments_and_blanks_are_skipped() {
        assert!(parse("").unwrap().is_none());
        assert!(parse("   # mkdisk -size=5").unwrap().is_none());
    }

    #[test]
    fn command_names_are_case_insensitive() {
        let cmd = parse("MKDISK -size=5 -path=/tmp/a.mia").unwrap().unwrap();
        assert_eq!(cmd.name, "mkdisk");
        assert_eq!(cmd.flags.value("size"), Some("5"));
        assert_eq!(cmd.flags.value("path"), Some("/tmp/a.mia"));
    }

    #[test]
    fn quoted_values_keep_spaces() {
        let cmd = parse(r#"mkdisk -path="/tmp/my disks/a.mia" -size=5"#)
            .unwrap()
            .unwrap();
        assert_eq!(cmd.flags.value("path"), Some("/tmp/my disks/a.mia"));
    }

    #[test]
    fn bare_flags_are_booleans() {
        let cmd = parse("mkfile -path=/a -r -size=12").unwrap().unwrap();
        assert!(cmd.flags.switch("r"));
        assert!(!cmd.flags.switch("p"));
    }

    #[test]
    fn paths_keep_their_case() {
        let cmd = parse("mkfile -path=/Docs/File1").unwrap().unwrap();
        assert_eq!(cmd.flags.value("path"), Some("/Docs/File1"));
    }
}

/// One-line usage hint per command, printed under error messages.
pub fn usage(command: &str) -> Option<&'static str> {
    Some(match command {
        "mkdisk" => "mkdisk -size=<n> -path=<file.mia> [-unit=k|m] [-fit=bf|ff|wf]",
        "rmdisk" => "rmdisk -path=<file.mia>",
        "fdisk" => {
            "fdisk -size=<n> -path=<file.mia> -name=<name> [-type=p|e|l] [-unit=b|k|m] \
             [-fit=bf|ff|wf] | -add=<delta> [-unit] | -delete=fast|full"
        }
        "mount" => "mount -path=<file.mia> -name=<partition>",
        "unmount" => "unmount -id=<mount id>",
        "mounted" => "mounted",
        "mkfs" => "mkfs -id=<mount id> [-type=full] [-fs=2fs|3fs]",
        "login" => "login -user=<name> -pass=<password> -id=<mount id>",
        "logout" => "logout",
        "mkgrp" => "mkgrp -name=<group>",
        "rmgrp" => "rmgrp -name=<group>",
        "mkusr" => "mkusr -user=<name> -pass=<password> -grp=<group>",
        "rmusr" => "rmusr -user=<name>",
        "chgrp" => "chgrp -user=<name> -grp=<group>",
        "mkfile" => "mkfile -path=<abs path> [-r] [-size=<n>] [-cont=<host file>]",
        "mkdir" => "mkdir -path=<abs path> [-p]",
        "cat" => "cat -file1=<abs path> [-file2 .. -file10]",
        "remove" => "remove -path=<abs path>",
        "edit" => "edit -path=<abs path> -contenido=<host file>",
        "rename" => "rename -path=<abs path> -name=<new name>",
        "copy" => "copy -path=<abs path> -destino=<abs dir>",
        "move" => "move -path=<abs path> -destino=<abs dir>",
        "find" => "find -path=<abs path> -name=<pattern with ? and *>",
        "chown" => "chown -path=<abs path> [-r] -usuario=<user>",
        "chmod" => "chmod -path=<abs path> -ugo=<three digits 0-7> [-r]",
        "loss" => "loss -id=<mount id>",
        "recovery" => "recovery -id=<mount id>",
        "journaling" => "journaling -id=<mount id>",
        "rep" => {
            "rep -name=mbr|disk|sb|tree|ls|file|bm_inode|bm_block|journaling \
             -path=<output file> -id=<mount id> [-path_file_ls=<abs path>]"
        }
        _ => return None,
    })
}
