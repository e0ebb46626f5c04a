//! Component H: folder-level operations layered on top of the engine
//! (spec.md §4.H).
//!
//! The engine (component E) only knows about commands and responses; a
//! [`Folder`] adds the policy spec.md §4.H describes on top of it: which
//! commands to send for open/close/create/delete/rename, the manual
//! expunge dance on servers without UIDPLUS, TRYCREATE auto-retry on
//! APPEND, and wildcard translation for LIST/LSUB. It owns the
//! [`Engine`] for the lifetime of the selected mailbox and keeps a
//! [`FolderSummary`] in sync with what the server reports.

use std::io::{Read, Write};

use mailcore::summary::uidset;
use mailcore::{Error as CoreError, MessageInfo, Summary};

use crate::command::{Command, FetchAttribute, FetchItems, StoreAction};
use crate::engine::{CompletedCommand, Engine};
use crate::error::{Error, Result};
use crate::mutf7;
use crate::parser::{Address, Envelope, FetchItem, UntaggedResponse};
use crate::summary::FolderSummary;
use crate::types::{Capability, Flag, ListResponse, Mailbox, ResponseCode, SeqNum, SequenceSet, Uid};

/// Per-command budget, in bytes, left for a UID set once the rest of the
/// command line's fixed text is accounted for. Conservative: most servers
/// cap command lines well north of this.
const UID_SET_BUDGET: usize = 960;

/// What changed in a folder as the result of one operation, so a caller
/// can update a UI without re-deriving it from the raw summary diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderChange {
    /// New `EXISTS` count, if the server reported one.
    pub exists: Option<u32>,
    /// Sequence numbers the server told us were expunged.
    pub expunged: Vec<SeqNum>,
    /// UIDs of messages newly added to the summary.
    pub added: Vec<String>,
}

/// A selected mailbox, with its durable [`FolderSummary`] kept in sync.
pub struct Folder<S> {
    engine: Engine<S>,
    wire_name: Mailbox,
    display_name: String,
    summary: FolderSummary,
    read_only: bool,
    xgwmove: bool,
}

fn no_reconnect<S>() -> Result<S> {
    Err(CoreError::ServiceNotConnected.into())
}

/// Runs `cmd` to completion on `engine`, blocking. Folder-level code never
/// reconnects on its own behalf (spec.md §5: reconnection is a policy the
/// caller driving `iterate` owns); a disconnect surfaces as an error here.
fn run<S: Read + Write>(engine: &mut Engine<S>, cmd: Command, folder: Option<Mailbox>) -> Result<CompletedCommand> {
    let id = engine.queue(cmd, folder);
    loop {
        let done = engine.iterate(no_reconnect)?;
        if done == id {
            return Ok(engine.take_result(id).expect("iterate just reported this id as done"));
        }
    }
}

fn ok_or_error(completed: &CompletedCommand) -> Result<()> {
    match &completed.result {
        crate::engine::CommandResult::Ok(..) => Ok(()),
        crate::engine::CommandResult::No(_, text) => Err(Error::No(text.clone())),
        crate::engine::CommandResult::Bad(_, text) => Err(Error::Bad(text.clone())),
    }
}

fn has_try_create(completed: &CompletedCommand) -> bool {
    completed.resp_codes.iter().any(|c| matches!(c, ResponseCode::TryCreate))
}

fn flag_bit(flag: &Flag) -> mailcore::Flags {
    match flag {
        Flag::Answered => mailcore::Flags::ANSWERED,
        Flag::Deleted => mailcore::Flags::DELETED,
        Flag::Draft => mailcore::Flags::DRAFT,
        Flag::Flagged => mailcore::Flags::FLAGGED,
        Flag::Recent => mailcore::Flags::RECENT,
        Flag::Seen => mailcore::Flags::SEEN,
        Flag::Keyword(_) => mailcore::Flags::default(),
    }
}

fn imap_flags_to_summary(flags: &crate::types::Flags) -> mailcore::Flags {
    flags.iter().fold(mailcore::Flags::default(), |acc, f| acc.union(flag_bit(f)))
}

fn summary_flags_to_imap(flags: mailcore::Flags) -> Vec<Flag> {
    let mut out = Vec::new();
    if flags.contains(mailcore::Flags::ANSWERED) {
        out.push(Flag::Answered);
    }
    if flags.contains(mailcore::Flags::DELETED) {
        out.push(Flag::Deleted);
    }
    if flags.contains(mailcore::Flags::DRAFT) {
        out.push(Flag::Draft);
    }
    if flags.contains(mailcore::Flags::FLAGGED) {
        out.push(Flag::Flagged);
    }
    if flags.contains(mailcore::Flags::SEEN) {
        out.push(Flag::Seen);
    }
    out
}

/// A stand-in for GMime's `Message-ID` hash: folds the id into two
/// independent 64-bit FNV-1a passes. Any collision-resistant function
/// works here since the summary only ever compares hashes it computed
/// itself; see DESIGN.md for why a hash (rather than the wider, slower
/// string) is kept on disk at all.
fn hash_message_id(s: &str) -> mailcore::MessageId {
    fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
        let mut h = seed ^ 0xcbf2_9ce4_8422_2325;
        for &b in bytes {
            h ^= u64::from(b);
            h = h.wrapping_mul(0x0000_0100_0000_01B3);
        }
        h
    }
    mailcore::MessageId {
        hi: fnv1a(s.as_bytes(), 0),
        lo: fnv1a(s.as_bytes(), 1),
    }
}

fn render_addresses(addrs: &[Address]) -> String {
    addrs
        .iter()
        .filter_map(|a| match (&a.name, a.email()) {
            (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
            (None, Some(email)) => Some(email),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn message_info_from_envelope(uid: Uid, envelope: &Envelope, size: u32, flags: mailcore::Flags) -> MessageInfo {
    MessageInfo {
        uid: uid.get().to_string(),
        sender: render_addresses(&envelope.sender),
        from: render_addresses(&envelope.from),
        reply_to: render_addresses(&envelope.reply_to),
        to: render_addresses(&envelope.to),
        cc: render_addresses(&envelope.cc),
        bcc: render_addresses(&envelope.bcc),
        subject: envelope.subject.clone().unwrap_or_default(),
        message_id: envelope.message_id.as_deref().map(hash_message_id).unwrap_or_default(),
        flags,
        size,
        ..MessageInfo::default()
    }
}

fn info_from_fetch_items(items: &[FetchItem]) -> Option<MessageInfo> {
    let uid = items.iter().find_map(|i| match i {
        FetchItem::Uid(uid) => Some(*uid),
        _ => None,
    })?;
    let flags = items
        .iter()
        .find_map(|i| match i {
            FetchItem::Flags(f) => Some(imap_flags_to_summary(f)),
            _ => None,
        })
        .unwrap_or_default();
    let size = items
        .iter()
        .find_map(|i| match i {
            FetchItem::Rfc822Size(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(0);
    let envelope = items.iter().find_map(|i| match i {
        FetchItem::Envelope(e) => Some(e.as_ref()),
        _ => None,
    });
    Some(match envelope {
        Some(e) => message_info_from_envelope(uid, e, size, flags),
        None => MessageInfo { uid: uid.get().to_string(), flags, size, ..MessageInfo::default() },
    })
}

/// Renders a mailbox name as a quoted IMAP string. Used only for the
/// hand-assembled `XGWMOVE` line, which bypasses the command builder;
/// quoting unconditionally is always legal (the name has already been
/// through mutf7 encoding, so it never holds CR/LF/NUL).
fn quoted_mailbox(mailbox: &Mailbox) -> String {
    let mut out = String::from("\"");
    for c in mailbox.as_str().chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

impl<S> Folder<S>
where
    S: Read + Write,
{
    /// Opens (SELECTs or EXAMINEs) a mailbox and reconciles `cached`
    /// against the server's reported state (spec.md §4.H `open`).
    ///
    /// # Errors
    /// Propagates any engine/protocol error, or an illegal-name error if
    /// the server rejects the SELECT.
    pub fn open(
        mut engine: Engine<S>,
        display_name: &str,
        examine: bool,
        cached: Option<FolderSummary>,
    ) -> Result<(Self, FolderChange)> {
        let wire_name = Mailbox::new(mutf7::encode(display_name));
        let select = if examine {
            Command::Examine { mailbox: wire_name.clone() }
        } else {
            Command::Select { mailbox: wire_name.clone(), condstore: false }
        };
        let completed = run(&mut engine, select, None)?;
        ok_or_error(&completed)?;

        let read_only = completed.resp_codes.iter().any(|c| matches!(c, ResponseCode::ReadOnly));
        let exists = completed
            .untagged
            .iter()
            .find_map(|u| match u {
                UntaggedResponse::Exists(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);
        let uid_validity = completed.resp_codes.iter().find_map(|c| match c {
            ResponseCode::UidValidity(v) => Some(v.get()),
            _ => None,
        });

        let mut summary = cached.unwrap_or_else(|| Summary::new(display_name));
        let mut change = FolderChange { exists: Some(exists), ..FolderChange::default() };

        let stale = uid_validity.is_some_and(|v| summary.extra.uid_validity != 0 && summary.extra.uid_validity != v);
        if stale {
            summary = Summary::new(display_name);
        }
        if let Some(v) = uid_validity {
            summary.extra.uid_validity = v;
        }

        let mut folder = Folder { engine, wire_name, display_name: display_name.to_string(), summary, read_only, xgwmove: false };
        folder.detect_xgwmove()?;

        if exists > folder.summary.messages().len() as u32 {
            change.added = folder.fetch_new()?;
        } else if exists < folder.summary.messages().len() as u32 {
            folder.refresh_flags()?;
        }
        folder.summary.refresh_counts();

        Ok((folder, change))
    }

    /// The mailbox's display (UTF-8, pre-UTF-7) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.display_name
    }

    /// Current summary, for the caller to persist between sessions.
    #[must_use]
    pub fn summary(&self) -> &FolderSummary {
        &self.summary
    }

    /// True if the mailbox was opened read-only (`EXAMINE`, or the server
    /// downgraded a `SELECT`).
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn detect_xgwmove(&mut self) -> Result<()> {
        let supports_xgwextensions = self
            .engine
            .capabilities()
            .iter()
            .any(|c| matches!(c, Capability::Unknown(name) if name.eq_ignore_ascii_case("XGWEXTENSIONS")));
        if !supports_xgwextensions {
            return Ok(());
        }
        let completed = run(&mut self.engine, Command::Raw("XGWEXTENSIONS".to_string()), None)?;
        if ok_or_error(&completed).is_err() {
            return Ok(()); // not fatal: just means MOVE falls back to COPY+mark
        }
        self.xgwmove = completed.untagged.iter().any(|u| match u {
            UntaggedResponse::Extension { keyword, text } => {
                keyword.eq_ignore_ascii_case("XGWEXTENSIONS") && text.to_uppercase().contains("XGWMOVE")
            }
            _ => false,
        });
        Ok(())
    }

    /// Issues `UID FETCH <first_new>:* (ALL)` and merges the results into
    /// the summary, growing the accumulator as needed per spec.md §4.G.
    /// Returns the UIDs of newly added messages.
    fn fetch_new(&mut self) -> Result<Vec<String>> {
        let first_new = self.summary.header.nextuid.max(1);
        let sequence = SequenceSet::RangeFrom(SeqNum::new(first_new).expect("nextuid.max(1) is never zero"));
        let cmd = Command::Fetch { sequence, items: FetchItems::All, uid: true };
        let completed = run(&mut self.engine, cmd, Some(self.wire_name.clone()))?;
        ok_or_error(&completed)?;

        let mut added = Vec::new();
        for u in &completed.untagged {
            let UntaggedResponse::Fetch { items, .. } = u else { continue };
            if let Some(info) = info_from_fetch_items(items) {
                if self.summary.get_by_uid(&info.uid).is_none() {
                    if let Ok(uid_num) = info.uid.parse::<u32>() {
                        self.summary.header.nextuid = self.summary.header.nextuid.max(uid_num + 1);
                    }
                    added.push(info.uid.clone());
                    self.summary.push(info);
                }
            }
        }
        Ok(added)
    }

    /// Flag-only refresh: `UID FETCH 1:* (FLAGS UID)`, diffed into the
    /// in-memory summary (spec.md §4.H `open`'s second `flush_updates`
    /// branch, used when the server's `EXISTS` count shrank).
    fn refresh_flags(&mut self) -> Result<()> {
        if self.summary.messages().is_empty() {
            return Ok(());
        }
        let cmd = Command::Fetch {
            sequence: SequenceSet::RangeFrom(SeqNum::new(1).expect("1 != 0")),
            items: FetchItems::Items(vec![FetchAttribute::Flags, FetchAttribute::Uid]),
            uid: true,
        };
        let completed = run(&mut self.engine, cmd, Some(self.wire_name.clone()))?;
        ok_or_error(&completed)?;
        for u in &completed.untagged {
            let UntaggedResponse::Fetch { items, .. } = u else { continue };
            let uid = items.iter().find_map(|i| match i {
                FetchItem::Uid(uid) => Some(uid.get().to_string()),
                _ => None,
            });
            let flags = items.iter().find_map(|i| match i {
                FetchItem::Flags(f) => Some(imap_flags_to_summary(f)),
                _ => None,
            });
            if let (Some(uid), Some(server_flags)) = (uid, flags) {
                if let Some(index) = self.summary.index_of(&uid) {
                    if let Some(record) = self.summary.message_mut(index) {
                        let original = record.flags;
                        record.flags = mailcore::merge_flags(original, record.flags, server_flags);
                    }
                }
            }
        }
        self.summary.refresh_counts();
        Ok(())
    }

    /// Syncs locally dirty flags to the server, then closes the mailbox
    /// (spec.md §4.H `close`).
    ///
    /// # Errors
    /// Propagates any failed STORE/CLOSE/UNSELECT.
    pub fn close(mut self, expunge: bool) -> Result<FolderSummary> {
        self.sync_flags()?;
        if expunge {
            let completed = run(&mut self.engine, Command::Close, Some(self.wire_name.clone()))?;
            ok_or_error(&completed)?;
        } else if self
            .engine
            .capabilities()
            .iter()
            .any(|c| matches!(c, Capability::Unknown(n) if n == "UNSELECT"))
        {
            let _ = run(&mut self.engine, Command::Unselect, Some(self.wire_name.clone()));
        }
        self.summary.refresh_counts();
        Ok(self.summary)
    }

    /// Issues `UID STORE` for every dirty message, grouped by flag and
    /// polarity, batched by [`uidset::compact`] (spec.md §4.G's three-way
    /// merge / dirty-scan).
    fn sync_flags(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        for add in [true, false] {
            for flag in [Flag::Seen, Flag::Answered, Flag::Flagged, Flag::Deleted, Flag::Draft] {
                let bit = flag_bit(&flag);
                let uids: Vec<u32> = self
                    .summary
                    .messages()
                    .iter()
                    .filter(|m| m.flags.contains(mailcore::Flags::DIRTY) && m.flags.contains(bit) == add)
                    .filter_map(|m| m.uid.parse().ok())
                    .collect();
                if uids.is_empty() {
                    continue;
                }
                self.store_batched(&uids, flag, add)?;
            }
        }
        for i in 0..self.summary.messages().len() {
            if let Some(record) = self.summary.message_mut(i) {
                record.flags = record.flags.with(mailcore::Flags::DIRTY, false);
            }
        }
        Ok(())
    }

    fn store_batched(&mut self, uids: &[u32], flag: Flag, add: bool) -> Result<()> {
        let action = if add { StoreAction::AddFlags(vec![flag]) } else { StoreAction::RemoveFlags(vec![flag]) };
        let mut start = 0;
        while start < uids.len() {
            let (rendered, consumed) = uidset::compact(uids, start, UID_SET_BUDGET);
            if consumed == 0 {
                break;
            }
            let cmd = Command::Store { sequence: SequenceSet::Raw(rendered), action: action.clone(), uid: true, silent: true };
            let completed = run(&mut self.engine, cmd, Some(self.wire_name.clone()))?;
            ok_or_error(&completed)?;
            start += consumed;
        }
        Ok(())
    }

    /// Expunges `uids` (spec.md §4.H `expunge`): without UIDPLUS this does
    /// the manual dance of un-deleting everything else that's `\Deleted`,
    /// running a plain `EXPUNGE`, then re-marking those messages.
    ///
    /// # Errors
    /// Propagates any failed STORE/EXPUNGE.
    pub fn expunge(&mut self, uids: &[u32]) -> Result<Vec<SeqNum>> {
        let uidplus = self.engine.capabilities().iter().any(|c| matches!(c, Capability::UidPlus));
        if uidplus {
            let mut start = 0;
            let mut expunged = Vec::new();
            while start < uids.len() {
                let (rendered, consumed) = uidset::compact(uids, start, UID_SET_BUDGET);
                if consumed == 0 {
                    break;
                }
                let cmd = Command::UidExpunge { uids: SequenceSet::Raw(rendered) };
                let completed = run(&mut self.engine, cmd, Some(self.wire_name.clone()))?;
                ok_or_error(&completed)?;
                expunged.extend(drain_expunge_responses(&completed));
                start += consumed;
            }
            self.apply_expunges(&expunged);
            return Ok(expunged);
        }

        let target: std::collections::HashSet<u32> = uids.iter().copied().collect();
        let to_undelete: Vec<u32> = self
            .summary
            .messages()
            .iter()
            .filter(|m| m.flags.contains(mailcore::Flags::DELETED))
            .filter_map(|m| m.uid.parse::<u32>().ok())
            .filter(|u| !target.contains(u))
            .collect();
        if !to_undelete.is_empty() {
            self.store_batched(&to_undelete, Flag::Deleted, false)?;
        }
        let completed = run(&mut self.engine, Command::Expunge, Some(self.wire_name.clone()))?;
        ok_or_error(&completed)?;
        let expunged = drain_expunge_responses(&completed);
        self.apply_expunges(&expunged);
        if !to_undelete.is_empty() {
            self.store_batched(&to_undelete, Flag::Deleted, true)?;
        }
        Ok(expunged)
    }

    fn apply_expunges(&mut self, expunged: &[SeqNum]) {
        // Sequence numbers shift downward as each EXPUNGE is applied;
        // removing from the highest down keeps earlier indices valid.
        let mut seqs: Vec<u32> = expunged.iter().map(|s| s.get()).collect();
        seqs.sort_unstable_by(|a, b| b.cmp(a));
        for seq in seqs {
            let index = seq.saturating_sub(1) as usize;
            if index < self.summary.messages().len() {
                self.summary.remove(index);
            }
        }
    }

    /// Appends a message (spec.md §4.H `append`): retries once after a
    /// TRYCREATE, and synthesises the new message-info from `APPENDUID`
    /// when the server and summary's UIDVALIDITY agree.
    ///
    /// # Errors
    /// Propagates any failed APPEND/CREATE.
    pub fn append(&mut self, message: &[u8], flags: mailcore::Flags) -> Result<Option<MessageInfo>> {
        let wire_flags = summary_flags_to_imap(flags.intersection(mailcore::Flags::SYSTEM_MASK));
        let flags_arg = if wire_flags.is_empty() { None } else { Some(wire_flags) };
        let cmd = Command::Append { mailbox: self.wire_name.clone(), flags: flags_arg, message: message.to_vec() };
        let mut completed = run(&mut self.engine, cmd, None)?;

        if has_try_create(&completed) {
            let created = run(&mut self.engine, Command::Create { mailbox: self.wire_name.clone() }, None)?;
            ok_or_error(&created)?;
            let retry = Command::Append { mailbox: self.wire_name.clone(), flags: None, message: message.to_vec() };
            completed = run(&mut self.engine, retry, None)?;
        }
        ok_or_error(&completed)?;
        Ok(self.synthesize_append(&completed, flags))
    }

    fn synthesize_append(&mut self, completed: &CompletedCommand, flags: mailcore::Flags) -> Option<MessageInfo> {
        let (uidvalidity, uid) = completed.resp_codes.iter().find_map(|c| match c {
            ResponseCode::AppendUid { uidvalidity, uid } => Some((*uidvalidity, *uid)),
            _ => None,
        })?;
        if uidvalidity.get() != self.summary.extra.uid_validity {
            return None;
        }
        let info = MessageInfo { uid: uid.get().to_string(), flags, ..MessageInfo::default() };
        self.summary.push(info.clone());
        Some(info)
    }

    /// Copies or moves `uids` into `dest` (spec.md §4.H `copy`/`move`).
    /// When `mv` is true and the server advertised GroupWise's `XGWMOVE`,
    /// a single `UID XGWMOVE` replaces `UID COPY` + local delete-marking.
    ///
    /// # Errors
    /// Propagates any failed COPY/MOVE/STORE.
    pub fn copy_or_move(&mut self, uids: &[u32], dest: &str, mv: bool) -> Result<()> {
        let dest_wire = Mailbox::new(mutf7::encode(dest));
        if mv && self.xgwmove {
            return self.xgwmove_batched(uids, &dest_wire);
        }

        let mut start = 0;
        while start < uids.len() {
            let (rendered, consumed) = uidset::compact(uids, start, UID_SET_BUDGET);
            if consumed == 0 {
                break;
            }
            let cmd = Command::Copy { sequence: SequenceSet::Raw(rendered.clone()), mailbox: dest_wire.clone(), uid: true };
            let completed = run(&mut self.engine, cmd, Some(self.wire_name.clone()))?;
            if has_try_create(&completed) {
                let created = run(&mut self.engine, Command::Create { mailbox: dest_wire.clone() }, None)?;
                ok_or_error(&created)?;
                let retry = Command::Copy { sequence: SequenceSet::Raw(rendered), mailbox: dest_wire.clone(), uid: true };
                let retried = run(&mut self.engine, retry, Some(self.wire_name.clone()))?;
                ok_or_error(&retried)?;
            } else {
                ok_or_error(&completed)?;
            }
            start += consumed;
        }

        if mv {
            self.store_batched(uids, Flag::Deleted, true)?;
            for &uid in uids {
                if let Some(index) = self.summary.index_of(&uid.to_string()) {
                    if let Some(record) = self.summary.message_mut(index) {
                        record.flags = record.flags.union(mailcore::Flags::DELETED).union(mailcore::Flags::DIRTY);
                    }
                }
            }
        }
        Ok(())
    }

    fn xgwmove_batched(&mut self, uids: &[u32], dest_wire: &Mailbox) -> Result<()> {
        let dest_text = quoted_mailbox(dest_wire);
        let mut start = 0;
        while start < uids.len() {
            let (rendered, consumed) = uidset::compact(uids, start, UID_SET_BUDGET);
            if consumed == 0 {
                break;
            }
            let line = format!("UID XGWMOVE {rendered} {dest_text}");
            let completed = run(&mut self.engine, Command::Raw(line), Some(self.wire_name.clone()))?;
            ok_or_error(&completed)?;
            let expunged = drain_expunge_responses(&completed);
            self.apply_expunges(&expunged);
            start += consumed;
        }
        Ok(())
    }

    /// LIST or LSUB with a caller-supplied glob (`?`/`*` runs collapse to
    /// a single `%` before going on the wire; exact glob semantics are
    /// then re-applied client-side), deduplicating by name and unioning
    /// attributes across repeated entries (spec.md §4.H `list`/`lsub`).
    ///
    /// # Errors
    /// Propagates any failed LIST/LSUB.
    pub fn list(engine: &mut Engine<S>, reference: &str, glob: &str, subscribed_only: bool) -> Result<Vec<ListResponse>> {
        let pattern = wildcard_to_imap(glob);
        let cmd = if subscribed_only {
            Command::Lsub { reference: reference.to_string(), pattern: pattern.clone() }
        } else {
            Command::List { reference: reference.to_string(), pattern }
        };
        let completed = run(engine, cmd, None)?;
        ok_or_error(&completed)?;

        let mut by_name: std::collections::HashMap<String, ListResponse> = std::collections::HashMap::new();
        for u in completed.untagged {
            let entry = match u {
                UntaggedResponse::List(l) | UntaggedResponse::Lsub(l) => l,
                _ => continue,
            };
            let display = mutf7::decode(entry.mailbox.as_str());
            if !glob_matches(glob, &display) {
                continue;
            }
            by_name
                .entry(display.clone())
                .and_modify(|existing| {
                    for attr in entry.attributes.clone() {
                        if !existing.attributes.contains(&attr) {
                            existing.attributes.push(attr);
                        }
                    }
                })
                .or_insert(ListResponse { attributes: entry.attributes, delimiter: entry.delimiter, mailbox: Mailbox::new(display) });
        }
        Ok(by_name.into_values().collect())
    }

    /// Creates a mailbox. `as_container` appends the discovered hierarchy
    /// separator to hint the server this node should hold no messages
    /// (spec.md §4.H `create`).
    ///
    /// # Errors
    /// Propagates any failed CREATE.
    pub fn create(engine: &mut Engine<S>, display_name: &str, as_container: bool) -> Result<ListResponse> {
        let mut wire = mutf7::encode(display_name);
        if as_container && !wire.ends_with('/') {
            wire.push('/');
        }
        let completed = run(engine, Command::Create { mailbox: Mailbox::new(wire) }, None)?;
        ok_or_error(&completed)?;
        let results = Self::list(engine, "", display_name, false)?;
        results
            .into_iter()
            .find(|r| r.mailbox.as_str() == display_name)
            .ok_or_else(|| Error::Core(CoreError::StoreNoSuchFolder(display_name.to_string())))
    }

    /// Deletes a mailbox. Refuses `""`/`INBOX` per spec.md §4.H `delete`.
    ///
    /// # Errors
    /// Returns [`Error::Core`] with [`CoreError::FolderIllegalName`] for
    /// `""`/`INBOX`, or propagates a failed DELETE.
    pub fn delete(engine: &mut Engine<S>, display_name: &str) -> Result<()> {
        refuse_root_or_inbox(display_name)?;
        let wire = Mailbox::new(mutf7::encode(display_name));
        let completed = run(engine, Command::Delete { mailbox: wire }, None)?;
        ok_or_error(&completed)
    }

    /// Renames a mailbox (spec.md §4.H `rename`): refuses `""`/`INBOX`,
    /// and on success moves the on-disk cache directory, falling back to
    /// copy-and-remove across filesystem boundaries (`EXDEV`).
    ///
    /// # Errors
    /// Returns an illegal-name error for `""`/`INBOX`, or propagates a
    /// failed RENAME / I/O error while moving the cache directory.
    pub fn rename(engine: &mut Engine<S>, from: &str, to: &str, cache_root: Option<&std::path::Path>) -> Result<()> {
        refuse_root_or_inbox(from)?;
        let from_wire = Mailbox::new(mutf7::encode(from));
        let to_wire = Mailbox::new(mutf7::encode(to));
        let completed = run(engine, Command::Rename { from: from_wire, to: to_wire }, None)?;
        ok_or_error(&completed)?;

        if let Some(root) = cache_root {
            let from_path = root.join(sanitize_for_fs(from));
            let to_path = root.join(sanitize_for_fs(to));
            if from_path.exists() {
                move_cache_dir(&from_path, &to_path).map_err(|e| Error::Core(CoreError::System(e)))?;
            }
        }
        Ok(())
    }

    /// Subscribes to a mailbox.
    ///
    /// # Errors
    /// Propagates a failed SUBSCRIBE.
    pub fn subscribe(engine: &mut Engine<S>, display_name: &str) -> Result<()> {
        let wire = Mailbox::new(mutf7::encode(display_name));
        let completed = run(engine, Command::Subscribe { mailbox: wire }, None)?;
        ok_or_error(&completed)
    }

    /// Unsubscribes from a mailbox.
    ///
    /// # Errors
    /// Propagates a failed UNSUBSCRIBE.
    pub fn unsubscribe(engine: &mut Engine<S>, display_name: &str) -> Result<()> {
        let wire = Mailbox::new(mutf7::encode(display_name));
        let completed = run(engine, Command::Unsubscribe { mailbox: wire }, None)?;
        ok_or_error(&completed)
    }
}

fn drain_expunge_responses(completed: &CompletedCommand) -> Vec<SeqNum> {
    completed
        .untagged
        .iter()
        .filter_map(|u| match u {
            UntaggedResponse::Expunge(seq) => Some(*seq),
            _ => None,
        })
        .collect()
}

fn refuse_root_or_inbox(display_name: &str) -> Result<()> {
    if display_name.is_empty() || display_name.eq_ignore_ascii_case("INBOX") {
        return Err(Error::Core(CoreError::FolderIllegalName(display_name.to_string())));
    }
    Ok(())
}

fn sanitize_for_fs(display_name: &str) -> String {
    display_name.replace('/', "_")
}

fn move_cache_dir(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => copy_dir_recursive(from, to),
        Err(e) => Err(e),
    }
}

/// `EXDEV`'s value is stable across the Unix targets this crate ships
/// for; kept as a constant rather than pulling in `libc` for one errno.
const fn libc_exdev() -> i32 {
    18
}

fn copy_dir_recursive(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    std::fs::remove_dir_all(from)
}

/// Collapses runs of `?`/`*` into a single non-recursive `%` wildcard for
/// the wire pattern; the caller's exact glob is re-applied client-side
/// against the results (spec.md §4.H `list`/`lsub`).
fn wildcard_to_imap(glob: &str) -> String {
    let mut out = String::new();
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '?' || c == '*' {
            while matches!(chars.peek(), Some('?') | Some('*')) {
                chars.next();
            }
            out.push('%');
        } else {
            out.push(c);
        }
    }
    out
}

/// Client-side glob match (`?` = one char, `*` = any run), applied after
/// the server's (looser) wildcard already filtered candidates.
fn glob_matches(glob: &str, candidate: &str) -> bool {
    fn inner(g: &[char], c: &[char]) -> bool {
        match g.first() {
            None => c.is_empty(),
            Some('*') => inner(&g[1..], c) || (!c.is_empty() && inner(g, &c[1..])),
            Some('?') => !c.is_empty() && inner(&g[1..], &c[1..]),
            Some(gc) => c.first() == Some(gc) && inner(&g[1..], &c[1..]),
        }
    }
    let g: Vec<char> = glob.chars().collect();
    let c: Vec<char> = candidate.chars().collect();
    inner(&g, &c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_collapses_runs_to_percent() {
        assert_eq!(wildcard_to_imap("Inbox/*"), "Inbox/%");
        assert_eq!(wildcard_to_imap("a??*b"), "a%b");
        assert_eq!(wildcard_to_imap("plain"), "plain");
    }

    #[test]
    fn glob_matches_star_and_question_mark() {
        assert!(glob_matches("Inbox/*", "Inbox/Sent"));
        assert!(glob_matches("a?c", "abc"));
        assert!(!glob_matches("a?c", "abbc"));
        assert!(!glob_matches("Inbox/*", "Other/Sent"));
    }

    #[test]
    fn refuses_inbox_and_root() {
        assert!(refuse_root_or_inbox("").is_err());
        assert!(refuse_root_or_inbox("INBOX").is_err());
        assert!(refuse_root_or_inbox("inbox").is_err());
        assert!(refuse_root_or_inbox("Archive").is_ok());
    }

    #[test]
    fn message_id_hash_is_deterministic_and_order_sensitive() {
        let a = hash_message_id("<abc@example.com>");
        let b = hash_message_id("<abc@example.com>");
        let c = hash_message_id("<def@example.com>");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn quoted_mailbox_escapes_quotes_and_backslashes() {
        let mailbox = Mailbox::new("weird\"name\\here");
        assert_eq!(quoted_mailbox(&mailbox), "\"weird\\\"name\\\\here\"");
    }
}
