use anyhow::{bail, Result};
use base64::Engine;
use tokio_util::bytes::{BufMut, BytesMut};

use super::types::*;

/// Writes a complete frame, trailing line feed included.
pub trait Encode {
    fn encode(&self, out: &mut BytesMut) -> Result<()>;
}

fn sp_enc(out: &mut BytesMut) {
    out.put(&[0x20][..])
}

fn lf_enc(out: &mut BytesMut) {
    out.put(&[0x0A][..])
}

fn mechanism_enc(name: &str, out: &mut BytesMut) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_');
    if !valid {
        bail!("{:?} is not a valid mechanism name", name);
    }
    out.put(name.as_bytes());
    Ok(())
}

fn payload_enc(data: &[u8], out: &mut BytesMut) {
    let b64 = base64::engine::general_purpose::STANDARD.encode(data);
    out.put(b64.as_bytes());
}

fn step_enc(data: &[u8], out: &mut BytesMut) {
    out.put(&b"C"[..]);
    if !data.is_empty() {
        out.put(&b","[..]);
        payload_enc(data, out);
    }
}

impl Encode for MechanismList {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        if self.is_empty() {
            bail!("refusing to advertise an empty mechanism list");
        }
        for (i, name) in self.iter().enumerate() {
            if i > 0 {
                sp_enc(out);
            }
            mechanism_enc(name, out)?;
        }
        Ok(())
    }
}

impl Encode for ServerFrame {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        match self {
            Self::Mechanisms(list) => list.encode(out)?,
            Self::Step(data) => step_enc(data, out),
            Self::Success => out.put(&b"A"[..]),
            Self::Failure => out.put(&b"E"[..]),
        }
        lf_enc(out);
        Ok(())
    }
}

impl Encode for ClientFrame {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        match self {
            Self::FirstStep {
                mechanism,
                initial_response,
            } => {
                mechanism_enc(mechanism, out)?;
                if let Some(data) = initial_response {
                    sp_enc(out);
                    payload_enc(data, out);
                }
            }
            Self::Step(data) => step_enc(data, out),
        }
        lf_enc(out);
        Ok(())
    }
}
