//! Pending changes and the mapping from raw `notify` events.
//!
//! Raw events are classified into four classes. Each class is debounced on
//! its own channel, so a change carries its class for routing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind, RenameMode};

/// How long the first half of a split rename waits for its partner.
pub const RENAME_PAIR_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Deleted,
    Renamed,
    Changed,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Created,
        ChangeKind::Deleted,
        ChangeKind::Renamed,
        ChangeKind::Changed,
    ];

    /// Position in [`ChangeKind::ALL`], used to pick the class channel.
    pub fn slot(self) -> usize {
        match self {
            ChangeKind::Created => 0,
            ChangeKind::Deleted => 1,
            ChangeKind::Renamed => 2,
            ChangeKind::Changed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Changed => "changed",
        }
    }
}

/// One filesystem change awaiting application.
///
/// `old_path` is set only for renames, which carry both identities in one
/// unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub old_path: Option<PathBuf>,
}

impl PendingChange {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::simple(path.into(), ChangeKind::Created)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::simple(path.into(), ChangeKind::Deleted)
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::simple(path.into(), ChangeKind::Changed)
    }

    pub fn renamed(old_path: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Renamed,
            old_path: Some(old_path.into()),
        }
    }

    fn simple(path: PathBuf, kind: ChangeKind) -> Self {
        Self {
            path,
            kind,
            old_path: None,
        }
    }
}

/// Changes of one class from one root, flushed together at window close.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub root: PathBuf,
    pub kind: ChangeKind,
    pub changes: Vec<PendingChange>,
}

/// Pairs the two halves of a rename that the OS reports separately.
///
/// Backends such as inotify emit `From` and `To` events linked by a cookie.
/// A `From` half is held until its `To` arrives; one that never gets a
/// partner was moved out of the watched tree and is reported as deleted.
#[derive(Debug)]
pub struct RenameTracker {
    held: HashMap<usize, (PathBuf, Instant)>,
    timeout: Duration,
}

impl RenameTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: HashMap::new(),
            timeout,
        }
    }

    pub fn hold(&mut self, cookie: usize, path: PathBuf, now: Instant) {
        self.held.insert(cookie, (path, now));
    }

    pub fn take(&mut self, cookie: usize) -> Option<PathBuf> {
        self.held.remove(&cookie).map(|(path, _)| path)
    }

    /// Remove and return halves that waited longer than the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<PathBuf> {
        let timeout = self.timeout;
        let mut expired = Vec::new();
        self.held.retain(|_, (path, held_at)| {
            if now.duration_since(*held_at) >= timeout {
                expired.push(std::mem::take(path));
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn pending(&self) -> usize {
        self.held.len()
    }
}

impl Default for RenameTracker {
    fn default() -> Self {
        Self::new(RENAME_PAIR_TIMEOUT)
    }
}

/// Map one raw event to zero or more pending changes.
///
/// `exists` is consulted only for ambiguous rename events that do not say
/// which side of the move they describe.
pub fn classify(
    event: &notify::Event,
    tracker: &mut RenameTracker,
    now: Instant,
    exists: impl Fn(&Path) -> bool,
) -> Vec<PendingChange> {
    let paths = &event.paths;
    match event.kind {
        EventKind::Create(_) => paths.iter().cloned().map(PendingChange::created).collect(),
        EventKind::Remove(_) => paths.iter().cloned().map(PendingChange::deleted).collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![PendingChange::renamed(from.clone(), to.clone())],
            _ => {
                crate::debug_event!("watcher", "malformed rename", "{paths:?}");
                Vec::new()
            }
        },

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => match event.attrs.tracker() {
            Some(cookie) => {
                for path in paths {
                    tracker.hold(cookie, path.clone(), now);
                }
                Vec::new()
            }
            None => paths.iter().cloned().map(PendingChange::deleted).collect(),
        },

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            let partner = event.attrs.tracker().and_then(|cookie| tracker.take(cookie));
            match (partner, paths.as_slice()) {
                (Some(from), [to]) => vec![PendingChange::renamed(from, to.clone())],
                (Some(from), _) => {
                    let mut changes = vec![PendingChange::deleted(from)];
                    changes.extend(paths.iter().cloned().map(PendingChange::created));
                    changes
                }
                (None, _) => paths.iter().cloned().map(PendingChange::created).collect(),
            }
        }

        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|path| {
                if exists(path) {
                    PendingChange::created(path.clone())
                } else {
                    PendingChange::deleted(path.clone())
                }
            })
            .collect(),

        EventKind::Modify(_) | EventKind::Any => {
            paths.iter().cloned().map(PendingChange::changed).collect()
        }

        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use notify::Event;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    fn run(event: &Event, tracker: &mut RenameTracker) -> Vec<PendingChange> {
        classify(event, tracker, Instant::now(), |_| true)
    }

    #[test]
    fn test_basic_classes() {
        let mut tracker = RenameTracker::default();

        assert_eq!(
            run(&event(EventKind::Create(CreateKind::File), &["/r/a"]), &mut tracker),
            vec![PendingChange::created("/r/a")]
        );
        assert_eq!(
            run(&event(EventKind::Remove(RemoveKind::Any), &["/r/a"]), &mut tracker),
            vec![PendingChange::deleted("/r/a")]
        );
        assert_eq!(
            run(
                &event(
                    EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                    &["/r/a"]
                ),
                &mut tracker
            ),
            vec![PendingChange::changed("/r/a")]
        );
        assert!(
            run(
                &event(EventKind::Access(AccessKind::Any), &["/r/a"]),
                &mut tracker
            )
            .is_empty()
        );
    }

    #[test]
    fn test_rename_both_carries_old_and_new() {
        let mut tracker = RenameTracker::default();
        let changes = run(
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/r/old.txt", "/r/new.txt"],
            ),
            &mut tracker,
        );

        assert_eq!(changes, vec![PendingChange::renamed("/r/old.txt", "/r/new.txt")]);
        assert_eq!(changes[0].kind, ChangeKind::Renamed);
    }

    #[test]
    fn test_split_rename_is_paired_by_cookie() {
        let mut tracker = RenameTracker::default();
        let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/r/a"])
            .set_tracker(7);
        let to = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/r/b"])
            .set_tracker(7);

        assert!(run(&from, &mut tracker).is_empty());
        assert_eq!(tracker.pending(), 1);
        assert_eq!(
            run(&to, &mut tracker),
            vec![PendingChange::renamed("/r/a", "/r/b")]
        );
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_unpaired_halves() {
        let mut tracker = RenameTracker::new(Duration::from_millis(10));

        // moved in from outside the tree
        let to = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/r/in"])
            .set_tracker(1);
        assert_eq!(run(&to, &mut tracker), vec![PendingChange::created("/r/in")]);

        // moved out of the tree
        let start = Instant::now();
        let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/r/out"])
            .set_tracker(2);
        classify(&from, &mut tracker, start, |_| true);
        assert!(tracker.expire(start).is_empty());
        assert_eq!(
            tracker.expire(start + Duration::from_millis(20)),
            vec![PathBuf::from("/r/out")]
        );

        // no cookie at all
        let bare = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/r/x"]);
        assert_eq!(run(&bare, &mut tracker), vec![PendingChange::deleted("/r/x")]);
    }

    #[test]
    fn test_ambiguous_rename_checks_existence() {
        let mut tracker = RenameTracker::default();
        let any = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            &["/r/here", "/r/gone"],
        );
        let changes = classify(&any, &mut tracker, Instant::now(), |p| p.ends_with("here"));

        assert_eq!(
            changes,
            vec![
                PendingChange::created("/r/here"),
                PendingChange::deleted("/r/gone")
            ]
        );
    }

    #[test]
    fn test_slots_are_distinct() {
        let mut slots: Vec<_> = ChangeKind::ALL.iter().map(|k| k.slot()).collect();
        slots.dedup();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }
}
