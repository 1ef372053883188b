//! # UGO权限
//!
//! 三个ASCII八进制位：属主看第一位，同组看第二位，其余看第三位。
//! root(uid=1) 绕过一切检查。

use enumflags2::{bitflags, BitFlags};

use crate::fs::users::Session;
use crate::layout::Inode;
use crate::{Error, Result};

/// 权限位，与八进制数位一致。
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    Exec = 1,
    Write = 2,
    Read = 4,
}

pub fn allows(inode: &Inode, session: &Session, perm: Perm) -> bool {
    if session.is_root() {
        return true;
    }
    let digit = if inode.uid == session.uid {
        inode.perm[0]
    } else if inode.gid == session.gid {
        inode.perm[1]
    } else {
        inode.perm[2]
    };
    BitFlags::<Perm>::from_bits_truncate(digit.wrapping_sub(b'0')).contains(perm)
}

pub fn require(inode: &Inode, session: &Session, perm: Perm, target: &str) -> Result<()> {
    if allows(inode, session, perm) {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "missing {} permission on {target}",
            verb(perm)
        )))
    }
}

fn verb(perm: Perm) -> &'static str {
    match perm {
        Perm::Read => "read",
        Perm::Write => "write",
        Perm::Exec => "exec",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::InodeKind;

    fn session(uid: i32, gid: i32) -> Session {
        Session {
            username: "u".into(),
            uid,
            gid,
            partition_id: "851A".into(),
        }
    }

    #[test]
    fn owner_group_other_digits() {
        let inode = Inode::new(InodeKind::File, 2, 3, *b"640", "2025-08-04 00:00");
        assert!(allows(&inode, &session(2, 9), Perm::Read));
        assert!(!allows(&inode, &session(2, 9), Perm::Write));
        assert!(allows(&inode, &session(8, 3), Perm::Read));
        assert!(!allows(&inode, &session(8, 3), Perm::Write));
        assert!(!allows(&inode, &session(8, 9), Perm::Read));
    }

    #[test]
    fn root_bypasses() {
        let inode = Inode::new(InodeKind::File, 2, 3, *b"000", "2025-08-04 00:00");
        assert!(allows(&inode, &session(1, 1), Perm::Write));
    }
}
