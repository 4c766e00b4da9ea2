use std::time;

pub static SMALL_DELAY: time::Duration = time::Duration::from_millis(200);

pub static DAEMON_ADDR: &str = "[::1]:8001";

pub static MECHANISMS: &[u8] = b"PLAIN LOGIN\n";

/// `\0alice\0hunter2`
pub static PLAIN_ALICE: &[u8] = b"PLAIN AGFsaWNlAGh1bnRlcjI=\n";
/// `\0alice\0hunter3`
pub static PLAIN_ALICE_WRONG: &[u8] = b"PLAIN AGFsaWNlAGh1bnRlcjM=\n";

pub static USERNAME_CHALLENGE: &[u8] = b"C,VXNlcm5hbWU6\n";
pub static PASSWORD_CHALLENGE: &[u8] = b"C,UGFzc3dvcmQ6\n";
pub static STEP_ALICE: &[u8] = b"C,YWxpY2U=\n";
pub static STEP_HUNTER2: &[u8] = b"C,aHVudGVyMg==\n";
