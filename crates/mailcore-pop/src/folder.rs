//! Component I: POP3 folder (maildrop) operations.
//!
//! POP3 has exactly one folder per account, so there's no create/delete/
//! rename/list here — only the UID strategy, deferred deletion, and
//! message retrieval spec.md §4.I describes.

use std::collections::HashMap;
use std::io::{Read, Write};

use mailcore::{Error as CoreError, MessageInfo, Summary};

use crate::command::Command;
use crate::engine::{CompletedCommand, Engine};
use crate::error::{Error, Result};
use crate::summary::FolderSummary;

fn no_reconnect<S>() -> Result<S> {
    Err(CoreError::ServiceNotConnected.into())
}

fn run<S: Read + Write>(engine: &mut Engine<S>, id: i64) -> Result<CompletedCommand> {
    loop {
        let done = engine.iterate(no_reconnect)?;
        if done == id {
            return engine.take_result(id).ok_or_else(|| {
                Error::Core(CoreError::ServiceProtocolError("command id missing from completion table".to_string()))
            });
        }
    }
}

fn ok_or_err(completed: &CompletedCommand) -> Result<()> {
    match &completed.result {
        crate::engine::CommandResult::Ok(_) => Ok(()),
        crate::engine::CommandResult::Err(text) => Err(Error::Err(text.clone())),
    }
}

/// One POP3 maildrop session: the engine, plus the session-local
/// sequence-id↔UID mapping and the durable summary.
pub struct Folder<S> {
    engine: Engine<S>,
    summary: FolderSummary,
    /// `seqid` for each known UID, rebuilt every [`Folder::sync`]. Not
    /// persisted: POP sequence ids are only stable within one session.
    seqid_by_uid: HashMap<String, u32>,
    /// Cleared the first time `UIDL` comes back `-ERR`, per spec.md
    /// §4.I's "remember probed UIDL unsupported" rule.
    uidl_supported: bool,
}

impl<S> Folder<S>
where
    S: Read + Write,
{
    /// Wraps an authenticated engine (past `USER`/`PASS`/`APOP`/`AUTH`)
    /// with an empty summary, ready for [`Folder::sync`].
    #[must_use]
    pub fn new(engine: Engine<S>) -> Self {
        Folder {
            engine,
            summary: Summary::new("INBOX"),
            seqid_by_uid: HashMap::new(),
            uidl_supported: true,
        }
    }

    /// The underlying summary.
    #[must_use]
    pub const fn summary(&self) -> &FolderSummary {
        &self.summary
    }

    /// Refreshes the seqid↔UID map (UIDL, falling back to LIST) and adds
    /// a bare [`MessageInfo`] for any UID not already in the summary.
    /// Messages the server no longer reports are left in the summary
    /// (the caller decides whether that means "expunged elsewhere" or
    /// "not yet synced"); their `seqid_by_uid` entry is simply absent,
    /// which make [`Folder::get_message`]/[`Folder::close`] skip them.
    ///
    /// # Errors
    /// Returns an error if both `UIDL` and the `LIST` fallback fail.
    pub fn sync(&mut self) -> Result<()> {
        let pairs = self.fetch_uid_map()?;
        self.seqid_by_uid.clear();
        for (seqid, uid) in &pairs {
            self.seqid_by_uid.insert(uid.clone(), *seqid);
            if self.summary.index_of(uid).is_none() {
                self.summary.push(MessageInfo {
                    uid: uid.clone(),
                    ..MessageInfo::default()
                });
            }
        }
        self.summary.refresh_counts();
        Ok(())
    }

    fn fetch_uid_map(&mut self) -> Result<Vec<(u32, String)>> {
        if self.uidl_supported {
            let id = self.engine.queue(Command::Uidl(None));
            let completed = run(&mut self.engine, id)?;
            if completed.result.is_ok() {
                return Ok(parse_uidl_lines(&completed.lines));
            }
            self.uidl_supported = false;
        }
        let id = self.engine.queue(Command::List(None));
        let completed = run(&mut self.engine, id)?;
        ok_or_err(&completed)?;
        Ok(parse_list_lines(&completed.lines))
    }

    /// Marks `uids` deleted locally. No wire traffic until
    /// [`Folder::close`] with `expunge = true`, matching IMAP's deferred
    /// `DELETED`-flag-then-sync model so both engines share the same
    /// "mark now, act on close" shape.
    pub fn expunge(&mut self, uids: &[String]) {
        for uid in uids {
            if let Some(index) = self.summary.index_of(uid) {
                if let Some(record) = self.summary.message_mut(index) {
                    record.flags = record.flags.with(mailcore::Flags::DELETED, true).with(mailcore::Flags::DIRTY, true);
                }
            }
        }
        self.summary.refresh_counts();
    }

    /// Issues one `DELE` per message marked expunged (if `expunge` is
    /// true), then `QUIT`.
    ///
    /// # Errors
    /// Returns an error if any `DELE` or the final `QUIT` is rejected.
    pub fn close(&mut self, expunge: bool) -> Result<()> {
        if expunge {
            let deleted: Vec<String> = self
                .summary
                .messages()
                .iter()
                .filter(|m| m.flags.contains(mailcore::Flags::DELETED))
                .map(|m| m.uid.clone())
                .collect();
            for uid in &deleted {
                let Some(&seqid) = self.seqid_by_uid.get(uid) else { continue };
                let id = self.engine.queue(Command::Dele(seqid));
                let completed = run(&mut self.engine, id)?;
                ok_or_err(&completed)?;
            }
        }
        let id = self.engine.queue(Command::Quit);
        let completed = run(&mut self.engine, id)?;
        ok_or_err(&completed)
    }

    /// Retrieves a message's full body via `RETR`, already CRLF- and
    /// dot-unstuffed by component C. MIME parsing is an external
    /// collaborator's job, so this returns raw bytes.
    ///
    /// # Errors
    /// Returns an error if the UID is unknown this session or `RETR` is
    /// rejected.
    pub fn get_message(&mut self, uid: &str) -> Result<Vec<u8>> {
        let seqid = self.seqid_for(uid)?;
        let id = self.engine.queue(Command::Retr(seqid));
        let completed = run(&mut self.engine, id)?;
        ok_or_err(&completed)?;
        Ok(completed.body.unwrap_or_default())
    }

    /// Retrieves just the header plus `lines` lines of the body via `TOP`.
    ///
    /// # Errors
    /// Returns an error if the UID is unknown this session, the server
    /// doesn't support `TOP`, or the command is rejected.
    pub fn get_headers(&mut self, uid: &str, lines: u32) -> Result<Vec<u8>> {
        let seqid = self.seqid_for(uid)?;
        let id = self.engine.queue(Command::Top(seqid, lines));
        let completed = run(&mut self.engine, id)?;
        ok_or_err(&completed)?;
        Ok(completed.body.unwrap_or_default())
    }

    fn seqid_for(&self, uid: &str) -> Result<u32> {
        self.seqid_by_uid
            .get(uid)
            .copied()
            .ok_or_else(|| Error::Core(CoreError::FolderNoSuchMessage(uid.to_string())))
    }
}

/// Parses `UIDL` response lines (`<seqid> <uid>`).
fn parse_uidl_lines(lines: &[String]) -> Vec<(u32, String)> {
    lines
        .iter()
        .filter_map(|l| {
            let mut parts = l.splitn(2, ' ');
            let seqid = parts.next()?.parse().ok()?;
            let uid = parts.next()?.trim().to_string();
            Some((seqid, uid))
        })
        .collect()
}

/// Parses `LIST` response lines (`<seqid> <octets>`), synthesising a
/// session-stable UID of `"<seqid>:<octets>"` per spec.md §4.I.
fn parse_list_lines(lines: &[String]) -> Vec<(u32, String)> {
    lines
        .iter()
        .filter_map(|l| {
            let mut parts = l.split_whitespace();
            let seqid: u32 = parts.next()?.parse().ok()?;
            let octets = parts.next()?;
            Some((seqid, format!("{seqid}:{octets}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uidl_lines() {
        let lines = vec!["1 whqtswO00WBw418f9t5JxYwZ".to_string(), "2 QhdPYR:00WBw1Ph7x7".to_string()];
        let parsed = parse_uidl_lines(&lines);
        assert_eq!(parsed, vec![(1, "whqtswO00WBw418f9t5JxYwZ".to_string()), (2, "QhdPYR:00WBw1Ph7x7".to_string())]);
    }

    #[test]
    fn parses_list_lines_into_seqid_octets_uid() {
        let lines = vec!["1 120".to_string(), "2 200".to_string()];
        let parsed = parse_list_lines(&lines);
        assert_eq!(parsed, vec![(1, "1:120".to_string()), (2, "2:200".to_string())]);
    }

    #[test]
    fn skips_malformed_lines() {
        assert!(parse_uidl_lines(&["garbage".to_string()]).is_empty());
        assert!(parse_list_lines(&["not-a-number x".to_string()]).is_empty());
    }
}
