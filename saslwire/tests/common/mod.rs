#![allow(dead_code)]
pub mod constants;

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::process::{Command, Output};
use std::thread;

use constants::*;

pub fn saslwire_server_daemon_dev(
    mut fx: impl FnMut(&mut TcpStream) -> Result<()>,
) -> Result<()> {
    // Check port is not used (= free) before starting the test
    let mut max_retry = 20;
    loop {
        max_retry -= 1;
        match (TcpStream::connect(DAEMON_ADDR), max_retry) {
            (Ok(_), 0) => bail!("something is listening on {} and prevent the test from starting", DAEMON_ADDR),
            (Ok(_), _) => println!("something is listening on {}, maybe a previous daemon quitting, retrying soon...", DAEMON_ADDR),
            (Err(_), _) => {
                println!("test ready to start, {} is free!", DAEMON_ADDR);
                break
            }
        }
        thread::sleep(SMALL_DELAY);
    }

    // Start daemon
    let mut daemon = Command::new(env!("CARGO_BIN_EXE_saslwire"))
        .arg("--dev")
        .arg("server")
        .arg("daemon")
        .spawn()?;

    // Check that our daemon is correctly listening on the free port
    let mut socket = connect().context("daemon must be listening")?;

    println!("-- ready to test the handshake --");
    let result = fx(&mut socket);
    println!("-- test teardown --");

    // the daemon may already have closed it
    let _ = socket.shutdown(Shutdown::Both);
    daemon.kill().context("daemon should be killed")?;

    result.context("all tests passed")
}

/// Retries until the daemon accepts and advertises its mechanisms
pub fn connect() -> Result<TcpStream> {
    let mut max_retry = 20;
    loop {
        max_retry -= 1;
        match (TcpStream::connect(DAEMON_ADDR), max_retry) {
            (Err(e), 0) => bail!("no more retry, last error is: {}", e),
            (Err(e), _) => {
                println!("unable to connect: {} ; will retry soon...", e);
            }
            (Ok(v), _) => return Ok(v),
        }
        thread::sleep(SMALL_DELAY);
    }
}

pub fn read_line<F: Read>(reader: &mut F) -> Result<Vec<u8>> {
    let mut line = vec![];
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte)? {
            0 => break,
            _ => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
        }
    }
    println!("read: {:?}", String::from_utf8_lossy(&line));
    Ok(line)
}

pub fn expect_line<F: Read>(reader: &mut F, expected: &[u8]) -> Result<()> {
    let line = read_line(reader)?;
    if line != expected {
        bail!(
            "expected {:?}, got {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&line)
        );
    }
    Ok(())
}

pub fn send_line<F: Write>(writer: &mut F, line: &[u8]) -> Result<()> {
    println!("write: {:?}", String::from_utf8_lossy(line));
    writer.write_all(line)?;
    writer.flush()?;
    Ok(())
}

pub fn saslwire_client(user: &str, password: &str) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_saslwire"))
        .arg("--dev")
        .arg("client")
        .arg("--user")
        .arg(user)
        .arg("--password")
        .arg(password)
        .output()?)
}
