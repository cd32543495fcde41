//! Decoder for the command list at the head of a receive-pack request.
//!
//! ```text
//! update-request = *shallow command-list [pack-file]
//! shallow        = PKT-LINE("shallow" SP obj-id LF)
//! command-list   = PKT-LINE(command NUL capability-list LF)
//!                  *PKT-LINE(command LF)
//!                  flush-pkt
//! command        = old-id SP new-id SP name
//! ```

use anyhow::{Context, bail};
use gix::hash::ObjectId;
use serde::{Deserialize, Serialize};

use crate::pkt::{Pkt, PktReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RefAction {
    Create,
    Update,
    Delete,
}

impl RefAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefAction::Create => "create",
            RefAction::Update => "update",
            RefAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for RefAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateCommand {
    pub name: String,
    pub old: ObjectId,
    pub new: ObjectId,
}

impl RefUpdateCommand {
    pub fn action(&self) -> RefAction {
        if self.old.is_null() {
            RefAction::Create
        } else if self.new.is_null() {
            RefAction::Delete
        } else {
            RefAction::Update
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct UpdateRequest {
    pub shallow: Vec<ObjectId>,
    pub capabilities: Vec<String>,
    pub commands: Vec<RefUpdateCommand>,
}

pub fn decode_update_request(body: &[u8]) -> anyhow::Result<UpdateRequest> {
    let mut reader = PktReader::new(body);
    let mut req = UpdateRequest::default();

    loop {
        let line = match reader.next_pkt()? {
            Some(Pkt::Data(line)) => line,
            Some(Pkt::Flush) => break,
            None => bail!("missing flush after command list"),
        };
        let line = line.strip_suffix(b"\n").unwrap_or(line);

        if let Some(oid) = line.strip_prefix(b"shallow ") {
            if !req.commands.is_empty() {
                bail!("shallow line after commands");
            }
            req.shallow.push(parse_oid(oid)?);
            continue;
        }

        let command = if req.commands.is_empty() {
            let nul = line
                .iter()
                .position(|b| *b == 0)
                .context("first command lacks capability list")?;
            let caps = std::str::from_utf8(&line[nul + 1..]).context("capabilities are not utf-8")?;
            req.capabilities = caps.split(' ').filter(|c| !c.is_empty()).map(str::to_string).collect();
            &line[..nul]
        } else {
            line
        };
        req.commands.push(parse_command(command)?);
    }

    if req.commands.is_empty() {
        bail!("empty command list");
    }
    Ok(req)
}

fn parse_command(line: &[u8]) -> anyhow::Result<RefUpdateCommand> {
    let mut parts = line.splitn(3, |b| *b == b' ');
    let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("malformed command line");
    };
    let name = std::str::from_utf8(name).context("ref name is not utf-8")?;
    if name.is_empty() {
        bail!("empty ref name");
    }
    let command = RefUpdateCommand {
        name: name.to_string(),
        old: parse_oid(old)?,
        new: parse_oid(new)?,
    };
    if command.old.is_null() && command.new.is_null() {
        bail!("command for {name} has neither old nor new id");
    }
    Ok(command)
}

fn parse_oid(hex: &[u8]) -> anyhow::Result<ObjectId> {
    ObjectId::from_hex(hex).with_context(|| format!("invalid object id {:?}", String::from_utf8_lossy(hex)))
}
