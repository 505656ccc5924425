//! Optimistic mutations over a keyed list.
//!
//! The store keeps two things: the `confirmed` items (what the server has acknowledged) and a
//! journal of mutations ordered by submission. The `view` handed to the UI is always
//! `confirmed` with every surviving journal entry replayed on top, in submission order. Nothing
//! is ever patched back: a rollback just drops the entry and the view is replayed again.
//!
//! Mutations settle independently, by id. Under [`ConflictPolicy::SubmissionOrder`] a mutation
//! that commits while an earlier one is still pending stays in the journal (as `Committed`, with
//! the server's canonical value) until everything submitted before it has settled; only then is
//! it folded into `confirmed`. That keeps `confirmed` equal to the in-order application of the
//! successful mutations, whatever order the server answers in.
//!
//! When an `Add` commits under a server key that differs from its temporary key, the store
//! remembers the alias. Later mutations aimed at the temporary key (already queued, or submitted
//! afterwards) are retargeted to the server key; an optional re-key hook rewrites the values they
//! carry (see [`OptimisticStore::set_rekey`]).

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::error::Error;
use core::fmt;
use core::ops::Bound;

use crate::MutationError;
use crate::key::{ItemKey, KeyMap};

/// Maps an item to its stable key.
pub type KeyOf<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Returns a copy of an item carrying a new key.
pub type Rekey<T, K> = Arc<dyn Fn(&T, &K) -> T + Send + Sync>;

/// Store-assigned mutation id. Ids increase strictly with submission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MutationId(pub(crate) u64);

impl MutationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MutationKind {
    Add,
    Update,
    Remove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MutationStatus {
    Pending,
    Committed,
    RolledBack,
}

/// How commits that race on the same key are ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConflictPolicy {
    /// Committed effects land in `confirmed` in submission order.
    #[default]
    SubmissionOrder,
    /// Committed effects land in `confirmed` as soon as they resolve, so the last mutation to
    /// resolve wins.
    LastWriteWins,
}

/// A speculative change to the list.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mutation<T, K> {
    /// Appends an item, usually carrying a temporary key until the server assigns a real one.
    Add(T),
    /// Replaces the item with the same key.
    Update(T),
    /// Removes the item with this key.
    Remove(K),
}

impl<T, K> Mutation<T, K> {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Add(_) => MutationKind::Add,
            Self::Update(_) => MutationKind::Update,
            Self::Remove(_) => MutationKind::Remove,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Add(v) | Self::Update(v) => Some(v),
            Self::Remove(_) => None,
        }
    }
}

/// The operation handed to the host's `submit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationOp<T, K> {
    pub id: MutationId,
    pub mutation: Mutation<T, K>,
}

impl<T, K> MutationOp<T, K> {
    pub fn kind(&self) -> MutationKind {
        self.mutation.kind()
    }
}

/// A journal entry.
#[derive(Clone, Debug)]
pub struct PendingMutation<T, K> {
    pub id: MutationId,
    pub kind: MutationKind,
    /// Key the mutation targets. For `Add` this is the temporary key until it commits; an
    /// `Update` or `Remove` aimed at that temporary key follows it to the server key.
    pub key: K,
    /// Effect replayed into the view: the optimistic value while pending, the canonical one once
    /// committed.
    pub effect: Mutation<T, K>,
    pub submitted_at: u64,
    pub status: MutationStatus,
}

/// Result of [`OptimisticStore::resolve`].
#[derive(Clone, Debug)]
pub enum Resolution<K> {
    Committed {
        id: MutationId,
        kind: MutationKind,
        /// The key of the affected item; for `Add` this is the server-assigned key.
        key: K,
    },
    RolledBack(MutationError),
    /// The id is unknown or already resolved; nothing changed.
    Ignored,
}

impl<K> Resolution<K> {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    pub fn error(&self) -> Option<&MutationError> {
        match self {
            Self::RolledBack(e) => Some(e),
            _ => None,
        }
    }
}

pub struct OptimisticStore<T, K> {
    key_of: KeyOf<T, K>,
    rekey: Option<Rekey<T, K>>,
    policy: ConflictPolicy,
    confirmed: Vec<T>,
    journal: BTreeMap<MutationId, PendingMutation<T, K>>,
    view: Vec<T>,
    /// Temporary key -> server key, for committed adds.
    aliases: KeyMap<K, K>,
    next_seq: u64,
}

impl<T: Clone, K: Clone> Clone for OptimisticStore<T, K> {
    fn clone(&self) -> Self {
        Self {
            key_of: Arc::clone(&self.key_of),
            rekey: self.rekey.clone(),
            policy: self.policy,
            confirmed: self.confirmed.clone(),
            journal: self.journal.clone(),
            view: self.view.clone(),
            aliases: self.aliases.clone(),
            next_seq: self.next_seq,
        }
    }
}

impl<T, K> fmt::Debug for OptimisticStore<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticStore")
            .field("policy", &self.policy)
            .field("confirmed", &self.confirmed.len())
            .field("journal", &self.journal.len())
            .field("view", &self.view.len())
            .field("aliases", &self.aliases.len())
            .finish_non_exhaustive()
    }
}

impl<T: Clone, K: ItemKey> OptimisticStore<T, K> {
    pub fn new(key_of: impl Fn(&T) -> K + Send + Sync + 'static, policy: ConflictPolicy) -> Self {
        Self::with_key_fn(Arc::new(key_of), policy)
    }

    pub fn with_key_fn(key_of: KeyOf<T, K>, policy: ConflictPolicy) -> Self {
        Self {
            key_of,
            rekey: None,
            policy,
            confirmed: Vec::new(),
            journal: BTreeMap::new(),
            view: Vec::new(),
            aliases: KeyMap::new(),
            next_seq: 0,
        }
    }

    /// Installs the hook used to move an `Update` value onto a server-assigned key.
    ///
    /// Without it, an update aimed at a temporary key still replaces the committed item, but
    /// keeps showing the temporary key until the update itself settles.
    pub fn set_rekey(&mut self, rekey: impl Fn(&T, &K) -> T + Send + Sync + 'static) {
        self.rekey = Some(Arc::new(rekey));
    }

    pub fn key_of(&self, item: &T) -> K {
        (self.key_of)(item)
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Changes how later commits are ordered. Entries already committed keep their place.
    pub fn set_policy(&mut self, policy: ConflictPolicy) {
        self.policy = policy;
    }

    /// The server key a committed temporary key was replaced by.
    pub fn resolve_alias(&self, key: &K) -> Option<&K> {
        self.aliases.get(key)
    }

    /// Items acknowledged by the server (loaded pages plus folded commits).
    pub fn confirmed(&self) -> &[T] {
        &self.confirmed
    }

    /// `confirmed` with every surviving mutation replayed in submission order.
    pub fn view(&self) -> &[T] {
        &self.view
    }

    pub fn view_index_of(&self, key: &K) -> Option<usize> {
        position(&self.view, &*self.key_of, key)
    }

    /// Journal entries in submission order (pending, or committed and waiting to be folded).
    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation<T, K>> {
        self.journal.values()
    }

    /// Number of mutations still waiting for the server.
    pub fn pending_count(&self) -> usize {
        self.journal
            .values()
            .filter(|m| m.status == MutationStatus::Pending)
            .count()
    }

    pub fn is_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Status of a mutation still in the journal; `None` once it has been garbage-collected.
    pub fn status(&self, id: MutationId) -> Option<MutationStatus> {
        self.journal.get(&id).map(|m| m.status)
    }

    /// Records a speculative mutation and applies it to the view immediately.
    ///
    /// The returned op must be passed to the host's `submit`; its outcome comes back through
    /// [`Self::resolve`].
    ///
    /// An `Update` or `Remove` naming the temporary key of an already committed `Add` is
    /// rewritten to target the server key, so the op handed to the host carries that key.
    pub fn mutate(&mut self, mutation: Mutation<T, K>) -> MutationOp<T, K> {
        self.next_seq += 1;
        let id = MutationId(self.next_seq);
        let (key, mutation) = self.retarget_new(mutation);
        let entry = PendingMutation {
            id,
            kind: mutation.kind(),
            key,
            effect: mutation.clone(),
            submitted_at: self.next_seq,
            status: MutationStatus::Pending,
        };

        // A new entry is always the newest, so it can be replayed on the current view directly.
        apply(&mut self.view, &*self.key_of, &entry.key, &entry.effect);
        self.journal.insert(id, entry);
        vdebug!(id = id.get(), kind = ?mutation.kind(), "mutate");
        MutationOp { id, mutation }
    }

    /// Settles mutation `id` with the host's answer.
    ///
    /// On success the canonical value replaces the optimistic one (an `Add` adopts the server's
    /// key). On failure the mutation is dropped and the view is replayed without it. Resolving an
    /// unknown or already settled id is a no-op.
    pub fn resolve<E>(&mut self, id: MutationId, result: Result<T, E>) -> Resolution<K>
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        let Some(entry) = self.journal.get_mut(&id) else {
            vdebug!(id = id.get(), "resolve: unknown or already settled");
            return Resolution::Ignored;
        };
        if entry.status != MutationStatus::Pending {
            return Resolution::Ignored;
        }

        match result {
            Ok(canonical) => {
                let kind = entry.kind;
                let previous = entry.key.clone();
                let key = match &entry.effect {
                    Mutation::Remove(k) => k.clone(),
                    Mutation::Add(_) | Mutation::Update(_) => (self.key_of)(&canonical),
                };
                entry.effect = match kind {
                    MutationKind::Add => Mutation::Add(canonical),
                    MutationKind::Update => Mutation::Update(canonical),
                    MutationKind::Remove => Mutation::Remove(key.clone()),
                };
                // Updates keep replacing the item they were aimed at.
                if kind == MutationKind::Add {
                    entry.key = key.clone();
                }
                entry.status = MutationStatus::Committed;

                if kind == MutationKind::Add && previous != key {
                    self.retarget_queued(id, &previous, &key);
                    self.aliases.insert(previous, key.clone());
                }
                if self.policy == ConflictPolicy::LastWriteWins {
                    if let Some(entry) = self.journal.remove(&id) {
                        apply(&mut self.confirmed, &*self.key_of, &entry.key, &entry.effect);
                    }
                }
                self.fold_settled();
                self.replay();
                vdebug!(id = id.get(), ?kind, "mutation committed");
                Resolution::Committed { id, kind, key }
            }
            Err(err) => {
                entry.status = MutationStatus::RolledBack;
                self.journal.remove(&id);
                self.fold_settled();
                self.replay();
                let err = MutationError::new(id, err);
                vdebug!(id = id.get(), error = %err, "mutation rolled back");
                Resolution::RolledBack(err)
            }
        }
    }

    /// Commits mutation `id` using its optimistic value as the canonical one.
    ///
    /// Convenient for removals and for hosts whose `submit` returns no body.
    pub fn commit_as_submitted(&mut self, id: MutationId) -> Resolution<K> {
        let canonical = match self.journal.get(&id).map(|m| &m.effect) {
            Some(Mutation::Add(v) | Mutation::Update(v)) => Some(v.clone()),
            Some(Mutation::Remove(_)) => None,
            None => return Resolution::Ignored,
        };
        match canonical {
            Some(v) => self.resolve::<MutationError>(id, Ok(v)),
            None => self.commit_removal(id),
        }
    }

    fn commit_removal(&mut self, id: MutationId) -> Resolution<K> {
        let Some(entry) = self.journal.get_mut(&id) else {
            return Resolution::Ignored;
        };
        if entry.status != MutationStatus::Pending {
            return Resolution::Ignored;
        }
        entry.status = MutationStatus::Committed;
        let key = entry.key.clone();
        if self.policy == ConflictPolicy::LastWriteWins {
            if let Some(entry) = self.journal.remove(&id) {
                apply(&mut self.confirmed, &*self.key_of, &entry.key, &entry.effect);
            }
        }
        self.fold_settled();
        self.replay();
        Resolution::Committed {
            id,
            kind: MutationKind::Remove,
            key,
        }
    }

    /// Appends loaded items to `confirmed`, skipping keys that are already confirmed.
    ///
    /// Returns the number of items actually appended.
    pub fn append_confirmed(&mut self, items: impl IntoIterator<Item = T>) -> usize {
        let before = self.confirmed.len();
        let appended = self.push_confirmed(items);
        if self.journal.is_empty() {
            self.view.extend_from_slice(&self.confirmed[before..]);
        } else {
            self.replay();
        }
        appended
    }

    /// Replaces `confirmed` wholesale (e.g. with a refreshed first page), keeping in-flight
    /// mutations on top. Duplicate keys are skipped; returns the number of items kept.
    pub fn replace_confirmed(&mut self, items: impl IntoIterator<Item = T>) -> usize {
        self.confirmed.clear();
        let kept = self.push_confirmed(items);
        self.replay();
        kept
    }

    fn push_confirmed(&mut self, items: impl IntoIterator<Item = T>) -> usize {
        let mut seen: KeyMap<K, ()> = self
            .confirmed
            .iter()
            .map(|it| ((self.key_of)(it), ()))
            .collect();
        let before = self.confirmed.len();
        for item in items {
            let key = (self.key_of)(&item);
            if seen.insert(key, ()).is_some() {
                vwarn!("skipping duplicate confirmed key");
                continue;
            }
            self.confirmed.push(item);
        }
        self.confirmed.len() - before
    }

    /// Rolls back every mutation still waiting for the server, leaving `confirmed` alone.
    ///
    /// Returns the ids dropped, in submission order; their late results are ignored.
    pub fn rollback_all(&mut self) -> Vec<MutationId> {
        let ids: Vec<MutationId> = self
            .journal
            .values()
            .filter(|m| m.status == MutationStatus::Pending)
            .map(|m| m.id)
            .collect();
        for id in &ids {
            self.journal.remove(id);
        }
        self.fold_settled();
        self.replay();
        vdebug!(rolled_back = ids.len(), "rollback_all");
        ids
    }

    /// Drops everything, including in-flight mutations; their late results are ignored.
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.journal.clear();
        self.view.clear();
        self.aliases.clear();
    }

    /// Resolves the target of a new mutation through the alias table.
    fn retarget_new(&self, mutation: Mutation<T, K>) -> (K, Mutation<T, K>) {
        match mutation {
            Mutation::Add(v) => ((self.key_of)(&v), Mutation::Add(v)),
            Mutation::Update(v) => {
                let key = (self.key_of)(&v);
                match self.aliases.get(&key) {
                    Some(server) => (server.clone(), Mutation::Update(self.rekeyed(v, server))),
                    None => (key, Mutation::Update(v)),
                }
            }
            Mutation::Remove(k) => {
                let key = self.aliases.get(&k).cloned().unwrap_or(k);
                (key.clone(), Mutation::Remove(key))
            }
        }
    }

    /// Points journal entries queued after `after` at `to` instead of `from`.
    fn retarget_queued(&mut self, after: MutationId, from: &K, to: &K) {
        let rekey = self.rekey.clone();
        let queued = self
            .journal
            .range_mut((Bound::Excluded(after), Bound::Unbounded))
            .map(|(_, entry)| entry);
        for entry in queued {
            if entry.kind == MutationKind::Add || entry.key != *from {
                continue;
            }
            entry.key = to.clone();
            match &mut entry.effect {
                Mutation::Remove(k) => *k = to.clone(),
                Mutation::Update(v) => {
                    if let Some(rekey) = &rekey {
                        *v = rekey(&*v, to);
                    }
                }
                Mutation::Add(_) => {}
            }
            vtrace!(id = entry.id.get(), "retargeted to server key");
        }
    }

    fn rekeyed(&self, value: T, key: &K) -> T {
        match &self.rekey {
            Some(rekey) => rekey(&value, key),
            None => value,
        }
    }

    /// Folds the committed prefix of the journal into `confirmed`.
    fn fold_settled(&mut self) {
        while let Some(entry) = self.journal.first_entry() {
            if entry.get().status != MutationStatus::Committed {
                break;
            }
            let entry = entry.remove();
            apply(&mut self.confirmed, &*self.key_of, &entry.key, &entry.effect);
        }
    }

    fn replay(&mut self) {
        self.view.clone_from(&self.confirmed);
        for entry in self.journal.values() {
            if entry.status == MutationStatus::RolledBack {
                continue;
            }
            apply(&mut self.view, &*self.key_of, &entry.key, &entry.effect);
        }
    }
}

fn position<T, K: PartialEq>(items: &[T], key_of: &dyn Fn(&T) -> K, key: &K) -> Option<usize> {
    items.iter().position(|it| key_of(it) == *key)
}

/// Applies `effect` to the item keyed `target`.
fn apply<T: Clone, K: PartialEq>(
    items: &mut Vec<T>,
    key_of: &dyn Fn(&T) -> K,
    target: &K,
    effect: &Mutation<T, K>,
) {
    let at = position(items, key_of, target);
    match (effect, at) {
        (Mutation::Add(value) | Mutation::Update(value), Some(i)) => items[i] = value.clone(),
        (Mutation::Add(value), None) => items.push(value.clone()),
        (Mutation::Remove(_), Some(i)) => {
            items.remove(i);
        }
        (Mutation::Update(_) | Mutation::Remove(_), None) => {}
    }
}
