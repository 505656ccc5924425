use crate::*;

use core::ops::Range;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use futures::channel::oneshot;
use futures::executor::{LocalPool, block_on};
use futures::future::{self, FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use lazylist::{
    FetchError, ListOptions, Message, Mutation, MutationId, MutationOp, Page, Resolution,
    Virtualizer,
};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Item {
    key: String,
    body: String,
}

fn item(key: impl ToString, body: &str) -> Item {
    Item {
        key: key.to_string(),
        body: body.to_string(),
    }
}

fn keys(items: &[Item]) -> Vec<&str> {
    items.iter().map(|it| it.key.as_str()).collect()
}

type Session = ListSession<Item, String, u32>;

fn session(options: SessionOptions) -> Session {
    ListSession::new(options, |it: &Item| it.key.clone())
}

fn fixed_options() -> SessionOptions {
    SessionOptions::new(
        ListOptions::fixed(40)
            .with_overscan(5)
            .with_lookahead_threshold(5),
    )
}

fn page(keys: Range<u32>, has_more: bool) -> Page<Item, u32> {
    let cursor = Some(keys.end);
    Page::new(keys.map(|k| item(k, "")).collect(), cursor, has_more)
}

/// A session showing `keys` in a 500-unit viewport.
fn loaded(options: SessionOptions, keys: Range<u32>, has_more: bool) -> Session {
    let mut s = session(options);
    s.on_viewport(500);
    let ticket = s.load_initial().unwrap();
    s.apply_fetch(&ticket, Ok(page(keys, has_more)));
    s
}

#[test]
fn paging_follows_the_rendered_window() {
    let mut s = session(fixed_options());
    assert!(s.on_viewport(500).is_none());

    let ticket = s.load_initial().unwrap();
    assert_eq!(ticket.cursor(), None);
    assert!(s.load_initial().is_none());

    let report = s.apply_fetch(&ticket, Ok(page(0..100, true)));
    assert!(matches!(
        report,
        LoadReport::Appended {
            appended: 100,
            exhausted: false
        }
    ));
    assert_eq!(s.items().len(), 18);
    assert_eq!(s.items()[0].key, "0");
    assert!(s.load_initial().is_none());

    // Near the tail: one fetch, even though a second scroll also qualifies.
    let next = s.on_scroll(3500, 0).unwrap();
    assert_eq!(next.cursor(), Some(&100));
    assert!(s.on_scroll(3400, 100).is_none());
    assert_eq!(s.scroll_offset(), 3400);
    assert!(s.loader_state().is_loading());

    let report = s.apply_fetch(&next, Ok(page(100..200, true)));
    assert!(matches!(report, LoadReport::Appended { appended: 100, .. }));
    assert_eq!(s.view().len(), 200);
    assert!(s.loader_state().is_idle());
    assert_eq!(s.range().unwrap().overscan_end, 102);
}

#[test]
fn items_are_the_rendered_slice_of_the_view() {
    let mut s = loaded(fixed_options(), 0..100, true);
    s.on_scroll(2000, 0);
    let range = s.range().unwrap();
    assert_eq!(range.start_index, 50);
    assert_eq!(s.items(), &s.view()[45..=67]);

    let layout: Vec<_> = s.rendered().map(|(l, it)| (l.index, l.start, it.key.clone())).collect();
    assert_eq!(layout.len(), 23);
    assert_eq!(layout[0], (45, 1800, "45".to_string()));
}

#[test]
fn scroll_is_throttled_to_one_offset_per_frame() {
    let mut s = loaded(fixed_options(), 0..100, true);

    s.on_scroll(100, 0);
    assert_eq!(s.scroll_offset(), 100);
    assert!(s.on_scroll(200, 5).is_none());
    s.on_scroll(300, 10);
    assert_eq!(s.scroll_offset(), 100);

    assert!(s.tick(12).is_none());
    assert_eq!(s.scroll_offset(), 100);
    s.tick(16);
    assert_eq!(s.scroll_offset(), 300);
    s.tick(40);
    assert_eq!(s.scroll_offset(), 300);
}

#[test]
fn deferred_scroll_can_trigger_a_fetch_on_tick() {
    let mut s = loaded(fixed_options(), 0..100, true);
    s.on_scroll(0, 0);
    assert!(s.on_scroll(3500, 1).is_none());
    let ticket = s.tick(20).unwrap();
    assert_eq!(ticket.cursor(), Some(&100));
}

#[test]
fn frame_throttle_keeps_only_the_latest_offset() {
    let mut t = FrameThrottle::new(16);
    assert_eq!(t.offer(1, 0), Some(1));
    assert_eq!(t.offer(2, 5), None);
    assert_eq!(t.offer(3, 6), None);
    assert!(t.has_deferred());
    assert_eq!(t.flush(10), None);
    assert_eq!(t.flush(16), Some(3));
    assert_eq!(t.flush(40), None);

    let mut every = FrameThrottle::new(0);
    assert_eq!(every.offer(1, 0), Some(1));
    assert_eq!(every.offer(2, 0), Some(2));
}

#[test]
fn removal_above_the_viewport_keeps_the_first_visible_item_still() {
    let options = SessionOptions::new(ListOptions::fixed(40).with_overscan(0));
    let mut s = loaded(options, 0..100, true);
    s.on_viewport(400);
    s.on_scroll(2000, 0);
    assert_eq!(s.items()[0].key, "50");

    s.mutate(Mutation::Remove("10".to_string())).unwrap();
    assert_eq!(s.view().len(), 99);
    assert_eq!(s.scroll_offset(), 1960);
    assert_eq!(s.items()[0].key, "50");

    let mut plain = loaded(options.with_preserve_anchor(false), 0..100, true);
    plain.on_viewport(400);
    plain.on_scroll(2000, 0);
    plain.mutate(Mutation::Remove("10".to_string())).unwrap();
    assert_eq!(plain.scroll_offset(), 2000);
    assert_eq!(plain.items()[0].key, "51");
}

#[test]
fn anchor_can_preserve_scroll_across_prepend() {
    let mut v1 = Virtualizer::new(ListOptions::fixed(1));
    v1.append_keys((0..100u64).map(|i| 1000 + i));
    v1.set_viewport_extent(10);
    v1.set_scroll_offset(50);

    let anchor = capture_first_visible_anchor(&v1).unwrap();
    assert_eq!(anchor.key, 1050);
    assert_eq!(anchor.offset_in_viewport, 0);

    // Prepend 10 items: old items shift by +10 indexes.
    let mut v2 = Virtualizer::new(ListOptions::fixed(1));
    v2.append_keys((0..10u64).map(|i| 2000 + i));
    v2.append_keys((0..100u64).map(|i| 1000 + i));
    v2.set_viewport_extent(10);
    v2.set_scroll_offset(50);

    assert!(apply_anchor(&mut v2, &anchor));
    assert_eq!(v2.scroll_offset(), 60);

    let gone = ScrollAnchor {
        key: 7u64,
        offset_in_viewport: 0,
    };
    assert!(!apply_anchor(&mut v2, &gone));
    assert_eq!(v2.scroll_offset(), 60);
}

#[test]
fn committed_add_keeps_its_slot_and_measurement() {
    let options = SessionOptions::new(ListOptions::measured(20).with_overscan(0));
    let mut s = loaded(options, 0..3, false);
    assert!(s.loader().is_exhausted());

    let op = s.mutate(Mutation::Add(item("tmp-1", "draft"))).unwrap();
    assert_eq!(keys(s.view()), ["0", "1", "2", "tmp-1"]);
    assert_eq!(s.measure(&"tmp-1".to_string(), Ok(55)), 0);
    assert_eq!(s.total_extent(), 115);

    let resolution = s.resolve_mutation(op.id, Ok::<_, Message>(item("42", "draft")));
    assert!(resolution.is_committed());
    assert_eq!(keys(s.view()), ["0", "1", "2", "42"]);
    assert_eq!(s.view()[3].body, "draft");
    assert_eq!(s.virtualizer().item_size(3), Some(55));
    assert_eq!(s.total_extent(), 115);
    assert_eq!(s.virtualizer().cached_size(&"tmp-1".to_string()), None);
}

#[test]
fn rejected_add_forgets_its_measurement() {
    let options = SessionOptions::new(ListOptions::measured(20));
    let mut s = loaded(options, 0..3, false);
    let op = s.mutate(Mutation::Add(item("tmp-1", ""))).unwrap();
    s.measure(&"tmp-1".to_string(), Ok(55));

    let resolution = s.resolve_mutation(op.id, Err(Message::new("quota")));
    assert!(resolution.error().is_some());
    assert_eq!(keys(s.view()), ["0", "1", "2"]);
    assert_eq!(s.virtualizer().cached_size(&"tmp-1".to_string()), None);
}

#[test]
fn rejected_remove_reappears_in_place() {
    let mut s = loaded(fixed_options(), 1..10, false);
    let op = s.mutate(Mutation::Remove("7".to_string())).unwrap();
    assert_eq!(s.view().len(), 8);
    assert_eq!(s.virtualizer().index_of(&"7".to_string()), None);

    let resolution = s.resolve_mutation(op.id, Err(Message::new("denied")));
    assert_eq!(resolution.error().unwrap().id, op.id);
    assert_eq!(s.virtualizer().index_of(&"7".to_string()), Some(6));
    assert_eq!(s.store().view_index_of(&"7".to_string()), Some(6));

    assert!(s.resolve_mutation(op.id, Err(Message::new("again"))).is_ignored());
}

#[test]
fn committed_remove_without_body() {
    let mut s = loaded(fixed_options(), 1..10, false);
    let op = s.mutate(Mutation::Remove("3".to_string())).unwrap();
    assert!(s.commit_mutation(op.id).is_committed());
    assert_eq!(s.store().confirmed().len(), 8);
    assert!(s.commit_mutation(op.id).is_ignored());
}

#[test]
fn edit_of_an_unconfirmed_row_survives_its_commit() {
    let mut s = loaded(fixed_options(), 0..3, false)
        .with_rekey(|it: &Item, key: &String| item(key, &it.body));
    let add = s.mutate(Mutation::Add(item("tmp-1", "draft"))).unwrap();
    let edit = s.mutate(Mutation::Update(item("tmp-1", "edited"))).unwrap();

    s.resolve_mutation(add.id, Ok::<_, Message>(item("42", "draft")));
    assert_eq!(keys(s.view()), ["0", "1", "2", "42"]);
    assert_eq!(s.view()[3].body, "edited");
    assert_eq!(s.virtualizer().index_of(&"42".to_string()), Some(3));

    let resolution = s.resolve_mutation(edit.id, Ok::<_, Message>(item("42", "edited")));
    assert!(resolution.is_committed());
    assert_eq!(s.store().confirmed()[3].body, "edited");
}

#[test]
fn rollback_all_discards_pending_mutations_only() {
    let options = SessionOptions::new(ListOptions::measured(20));
    let mut s = loaded(options, 0..5, false);
    let remove = s.mutate(Mutation::Remove("1".to_string())).unwrap();
    let add = s.mutate(Mutation::Add(item("tmp-1", "new"))).unwrap();
    s.measure(&"tmp-1".to_string(), Ok(70));
    assert_eq!(keys(s.view()), ["0", "2", "3", "4", "tmp-1"]);

    assert_eq!(s.rollback_all(), [remove.id, add.id]);
    assert_eq!(keys(s.view()), ["0", "1", "2", "3", "4"]);
    assert_eq!(s.virtualizer().cached_size(&"tmp-1".to_string()), None);
    assert_eq!(s.total_extent(), 100);
    assert!(
        s.resolve_mutation(add.id, Ok::<_, Message>(item("42", "new")))
            .is_ignored()
    );
}

#[test]
fn removals_that_expose_the_loaded_tail_make_a_fetch_due() {
    let mut s = loaded(fixed_options(), 0..30, true);
    for key in 20..27 {
        s.mutate(Mutation::Remove(key.to_string())).unwrap();
        assert!(s.trigger().is_none());
    }
    s.mutate(Mutation::Remove("27".to_string())).unwrap();
    let ticket = s.trigger().unwrap();
    assert_eq!(ticket.cursor(), Some(&30));
}

#[test]
fn set_options_updates_every_part_of_the_session() {
    let mut s = loaded(fixed_options(), 0..30, true);
    assert!(s.trigger().is_none());

    let options = SessionOptions::new(
        ListOptions::fixed(40)
            .with_overscan(5)
            .with_lookahead_threshold(15),
    )
    .with_frame_interval_ms(0);
    let ticket = s.set_options(options).unwrap();
    assert_eq!(ticket.cursor(), Some(&30));
    assert_eq!(s.loader().lookahead_threshold(), 15);
    assert_eq!(s.options(), &options);

    s.on_scroll(100, 0);
    s.on_scroll(200, 0);
    assert_eq!(s.scroll_offset(), 200);
    assert!(std::format!("{s:?}").starts_with("ListSession"));
}

#[test]
fn changing_the_sizing_keeps_the_first_visible_row_still() {
    let options = SessionOptions::new(ListOptions::measured(20).with_overscan(0));
    let mut s = loaded(options, 0..50, false);
    s.on_scroll(400, 0);
    assert_eq!(s.measure(&"5".to_string(), Ok(60)), 40);
    assert_eq!(s.scroll_offset(), 440);
    assert_eq!(s.items()[0].key, "20");

    s.set_options(SessionOptions::new(ListOptions::fixed(20).with_overscan(0)));
    assert_eq!(s.total_extent(), 1000);
    assert_eq!(s.scroll_offset(), 400);
    assert_eq!(s.items()[0].key, "20");
}

#[test]
fn refresh_keeps_items_until_the_first_page_arrives() {
    let mut s = loaded(fixed_options(), 0..100, true);
    let more = s.on_scroll(3500, 0).unwrap();
    let op = s.mutate(Mutation::Update(item("3", "edited"))).unwrap();

    let ticket = s.refresh().unwrap();
    assert_eq!(ticket.page(), 0);
    assert_eq!(ticket.cursor(), None);
    assert_eq!(s.view().len(), 100);
    assert!(s.loader_state().is_loading());
    assert!(s.load_initial().is_none());

    let late = s.apply_fetch(&more, Ok(page(100..200, true)));
    assert!(matches!(late, LoadReport::Stale));
    assert_eq!(s.view().len(), 100);

    let fresh = Page::new((0..50).map(|k| item(k, "fresh")).collect(), Some(50), true);
    assert!(matches!(
        s.apply_fetch(&ticket, Ok(fresh)),
        LoadReport::Appended {
            appended: 50,
            exhausted: false
        }
    ));
    assert_eq!(s.view().len(), 50);
    assert_eq!(s.view()[0].body, "fresh");
    assert_eq!(s.view()[3].body, "edited");
    assert_eq!(s.scroll_offset(), s.virtualizer().max_scroll_offset());
    assert!(
        s.resolve_mutation(op.id, Ok::<_, Message>(item("3", "edited")))
            .is_committed()
    );
}

#[test]
fn failed_fetch_waits_for_retry_with_the_same_cursor() {
    let mut s = loaded(fixed_options(), 0..100, true);
    let ticket = s.on_scroll(3500, 0).unwrap();
    let report = s.apply_fetch(&ticket, Err(FetchError::msg("offline")));
    assert!(matches!(report, LoadReport::Failed(_)));
    assert!(s.loader_state().error().is_some());

    assert!(s.load_more().is_none());
    assert!(s.on_scroll(3480, 100).is_none());

    let again = s.retry().unwrap();
    assert_eq!(again.cursor(), Some(&100));
    assert_eq!(again.page(), 1);
    assert!(s.retry().is_none());
}

#[test]
fn reset_drops_late_results() {
    let mut s = loaded(fixed_options(), 0..100, true);
    let op = s.mutate(Mutation::Update(item("1", "edited"))).unwrap();
    let ticket = s.load_more().unwrap();
    let generation = s.generation();

    s.reset();
    assert!(s.generation() > generation);
    assert!(s.view().is_empty());
    assert!(s.items().is_empty());
    assert_eq!(s.scroll_offset(), 0);

    let report = s.apply_fetch(&ticket, Ok(page(100..200, true)));
    assert!(matches!(report, LoadReport::Stale));
    assert!(s.view().is_empty());
    assert!(
        s.resolve_mutation(op.id, Ok::<_, Message>(item("1", "edited")))
            .is_ignored()
    );

    let fresh = s.load_initial().unwrap();
    assert_eq!(fresh.cursor(), None);
}

#[test]
fn disposed_session_ignores_everything() {
    let mut s = loaded(fixed_options(), 0..100, true);
    let ticket = s.load_more().unwrap();
    let op = s.mutate(Mutation::Remove("1".to_string())).unwrap();

    s.dispose();
    assert!(s.is_disposed());
    assert!(s.on_viewport(800).is_none());
    assert!(s.on_scroll(3500, 1000).is_none());
    assert!(s.tick(2000).is_none());
    assert!(s.load_initial().is_none());
    assert!(s.load_more().is_none());
    assert!(s.mutate(Mutation::Remove("2".to_string())).is_none());
    assert!(matches!(
        s.apply_fetch(&ticket, Ok(page(100..200, true))),
        LoadReport::Stale
    ));
    assert!(
        s.resolve_mutation(op.id, Ok::<_, Message>(item("1", "")))
            .is_ignored()
    );
    assert_eq!(s.measure(&"1".to_string(), Ok(10)), 0);
    assert!(s.view().is_empty());
}

// --- async driver --------------------------------------------------------------------------

/// Serves `0..total` in pages of `page_size`, resolving immediately.
struct Numbers {
    total: u32,
    page_size: u32,
    calls: Cell<usize>,
}

impl Numbers {
    fn new(total: u32, page_size: u32) -> Self {
        Self {
            total,
            page_size,
            calls: Cell::new(0),
        }
    }
}

impl DataSource<Item, u32> for Numbers {
    type Error = FetchError;

    fn fetch(&self, cursor: Option<u32>) -> LocalBoxFuture<'_, Result<Page<Item, u32>, FetchError>> {
        self.calls.set(self.calls.get() + 1);
        let start = cursor.unwrap_or(0);
        let end = (start + self.page_size).min(self.total);
        future::ready(Ok(page(start..end, end < self.total))).boxed_local()
    }
}

type PageSender = oneshot::Sender<Result<Page<Item, u32>, FetchError>>;

/// A source whose fetches settle only when the test says so.
#[derive(Default)]
struct ManualSource {
    calls: Cell<usize>,
    waiting: RefCell<Vec<(Option<u32>, PageSender)>>,
}

impl ManualSource {
    fn complete(&self, result: Result<Page<Item, u32>, FetchError>) {
        let (_, tx) = self.waiting.borrow_mut().remove(0);
        let _ = tx.send(result);
    }
}

impl DataSource<Item, u32> for ManualSource {
    type Error = FetchError;

    fn fetch(&self, cursor: Option<u32>) -> LocalBoxFuture<'_, Result<Page<Item, u32>, FetchError>> {
        self.calls.set(self.calls.get() + 1);
        let (tx, rx) = oneshot::channel();
        self.waiting.borrow_mut().push((cursor, tx));
        async move { rx.await.unwrap_or_else(|_| Err(FetchError::msg("dropped"))) }.boxed_local()
    }
}

type ItemSender = oneshot::Sender<Result<Item, Message>>;

#[derive(Default)]
struct ManualSink {
    waiting: RefCell<Vec<(MutationOp<Item, String>, ItemSender)>>,
}

impl ManualSink {
    fn ids(&self) -> Vec<MutationId> {
        self.waiting.borrow().iter().map(|(op, _)| op.id).collect()
    }

    fn settle(&self, id: MutationId, result: Result<Item, Message>) {
        let tx = {
            let mut waiting = self.waiting.borrow_mut();
            let pos = waiting.iter().position(|(op, _)| op.id == id).unwrap();
            waiting.remove(pos).1
        };
        let _ = tx.send(result);
    }
}

impl MutationSink<Item, String> for ManualSink {
    type Error = Message;

    fn submit(&self, op: MutationOp<Item, String>) -> LocalBoxFuture<'_, Result<Item, Message>> {
        let (tx, rx) = oneshot::channel();
        self.waiting.borrow_mut().push((op, tx));
        async move { rx.await.unwrap_or_else(|_| Err(Message::new("dropped"))) }.boxed_local()
    }
}

#[test]
fn initial_load_keeps_fetching_until_the_viewport_is_filled() {
    let handle = SessionHandle::new(session(fixed_options()));
    handle.session_mut().on_viewport(1000);
    let source = Numbers::new(12, 5);

    let report = block_on(handle.load_initial(&source));
    assert!(matches!(
        report,
        Some(LoadReport::Appended {
            appended: 2,
            exhausted: true
        })
    ));
    assert_eq!(source.calls.get(), 3);
    assert_eq!(handle.session().view().len(), 12);
    assert!(handle.session().loader().is_exhausted());

    assert!(block_on(handle.load_initial(&source)).is_none());
    assert!(block_on(handle.load_more(&source)).is_none());
    assert_eq!(source.calls.get(), 3);
}

#[test]
fn concurrent_scrolls_issue_a_single_fetch() {
    let handle = SessionHandle::new(loaded(fixed_options(), 0..100, true));
    let source = Rc::new(ManualSource::default());
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    for (offset, now_ms) in [(3500, 0), (3460, 20)] {
        let h = handle.clone();
        let src = Rc::clone(&source);
        spawner
            .spawn_local(async move {
                h.scroll(offset, now_ms, &*src).await;
            })
            .unwrap();
    }
    pool.run_until_stalled();

    assert_eq!(source.calls.get(), 1);
    assert_eq!(source.waiting.borrow()[0].0, Some(100));
    assert!(handle.session().loader().is_loading());
    assert_eq!(handle.session().scroll_offset(), 3460);

    source.complete(Ok(page(100..200, true)));
    pool.run_until_stalled();

    assert_eq!(handle.session().view().len(), 200);
    assert!(handle.session().loader_state().is_idle());
    assert_eq!(source.calls.get(), 1);
}

#[test]
fn failed_fetch_is_retried_through_the_handle() {
    let handle = SessionHandle::new(session(fixed_options()));
    handle.session_mut().on_viewport(500);
    let source = Rc::new(ManualSource::default());
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    let reports: Rc<RefCell<Vec<Option<LoadReport>>>> = Rc::default();
    {
        let (h, src, out) = (handle.clone(), Rc::clone(&source), Rc::clone(&reports));
        spawner
            .spawn_local(async move {
                let report = h.load_initial(&*src).await;
                out.borrow_mut().push(report);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    source.complete(Err(FetchError::msg("offline")));
    pool.run_until_stalled();
    assert!(matches!(reports.borrow()[0], Some(LoadReport::Failed(_))));

    {
        let (h, src, out) = (handle.clone(), Rc::clone(&source), Rc::clone(&reports));
        spawner
            .spawn_local(async move {
                let report = h.retry(&*src).await;
                out.borrow_mut().push(report);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert_eq!(source.calls.get(), 2);
    assert_eq!(source.waiting.borrow()[0].0, None);

    source.complete(Ok(page(0..100, true)));
    pool.run_until_stalled();
    assert!(matches!(
        reports.borrow()[1],
        Some(LoadReport::Appended { appended: 100, .. })
    ));
}

#[test]
fn disposing_during_a_fetch_drops_its_result() {
    let handle = SessionHandle::new(session(fixed_options()));
    handle.session_mut().on_viewport(500);
    let source = Rc::new(ManualSource::default());
    let mut pool = LocalPool::new();

    let report: Rc<RefCell<Option<LoadReport>>> = Rc::default();
    {
        let (h, src, out) = (handle.clone(), Rc::clone(&source), Rc::clone(&report));
        pool.spawner()
            .spawn_local(async move {
                *out.borrow_mut() = h.load_initial(&*src).await;
            })
            .unwrap();
    }
    pool.run_until_stalled();
    handle.session_mut().dispose();

    source.complete(Ok(page(0..100, true)));
    pool.run_until_stalled();
    assert!(matches!(*report.borrow(), Some(LoadReport::Stale)));
    assert!(handle.session().view().is_empty());
}

#[test]
fn mutations_resolving_out_of_order_confirm_in_submission_order() {
    let handle = SessionHandle::new(loaded(fixed_options(), 1..10, false));
    let sink = Rc::new(ManualSink::default());
    let source = Rc::new(Numbers::new(0, 10));
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    let resolutions: Rc<RefCell<Vec<Resolution<String>>>> = Rc::default();
    for body in ["b", "c"] {
        let (h, sink, out) = (handle.clone(), Rc::clone(&sink), Rc::clone(&resolutions));
        let src = Rc::clone(&source);
        spawner
            .spawn_local(async move {
                let mutation = Mutation::Update(item("1", body));
                if let Some(r) = h.mutate(&*sink, &*src, mutation).await {
                    out.borrow_mut().push(r);
                }
            })
            .unwrap();
        pool.run_until_stalled();
    }

    let ids = sink.ids();
    assert_eq!(ids.len(), 2);
    assert_eq!(handle.session().view()[0].body, "c");
    assert_eq!(handle.session().store().pending_count(), 2);

    sink.settle(ids[1], Ok(item("1", "c")));
    pool.run_until_stalled();
    assert_eq!(handle.session().store().confirmed()[0].body, "");
    assert_eq!(handle.session().view()[0].body, "c");

    sink.settle(ids[0], Ok(item("1", "b")));
    pool.run_until_stalled();
    assert_eq!(handle.session().store().confirmed()[0].body, "c");
    assert_eq!(handle.session().view()[0].body, "c");
    assert_eq!(resolutions.borrow().len(), 2);
    assert!(resolutions.borrow().iter().all(Resolution::is_committed));
}

#[test]
fn rejected_mutation_rolls_back_without_touching_others() {
    let handle = SessionHandle::new(loaded(fixed_options(), 1..10, false));
    let sink = Rc::new(ManualSink::default());
    let source = Rc::new(Numbers::new(0, 10));
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    for mutation in [
        Mutation::Remove("7".to_string()),
        Mutation::Add(item("tmp-1", "new")),
    ] {
        let (h, sink, src) = (handle.clone(), Rc::clone(&sink), Rc::clone(&source));
        spawner
            .spawn_local(async move {
                h.mutate(&*sink, &*src, mutation).await;
            })
            .unwrap();
        pool.run_until_stalled();
    }
    assert_eq!(handle.session().view().len(), 9);

    let ids = sink.ids();
    sink.settle(ids[0], Err(Message::new("forbidden")));
    pool.run_until_stalled();
    assert_eq!(
        handle.session().store().view_index_of(&"7".to_string()),
        Some(6)
    );
    assert_eq!(handle.session().view().len(), 10);

    sink.settle(ids[1], Ok(item("42", "new")));
    pool.run_until_stalled();
    assert_eq!(keys(handle.session().view())[9], "42");
    assert!(!handle.session().store().is_pending());
}

#[test]
fn removing_rows_through_the_handle_refills_the_tail() {
    let handle = SessionHandle::new(loaded(fixed_options(), 0..30, true));
    let sink = Rc::new(ManualSink::default());
    let source = Rc::new(Numbers::new(60, 30));
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    for key in 20..28 {
        let (h, sink, src) = (handle.clone(), Rc::clone(&sink), Rc::clone(&source));
        spawner
            .spawn_local(async move {
                h.mutate(&*sink, &*src, Mutation::Remove(key.to_string()))
                    .await;
            })
            .unwrap();
        pool.run_until_stalled();
    }
    // The fetch ran while the removals were still in flight.
    assert_eq!(source.calls.get(), 1);
    assert_eq!(handle.session().view().len(), 52);
    assert!(handle.session().loader().is_exhausted());
    assert_eq!(handle.session().store().pending_count(), 8);

    for id in sink.ids() {
        sink.settle(id, Ok(item("", "")));
    }
    pool.run_until_stalled();
    assert!(!handle.session().store().is_pending());
    assert_eq!(handle.session().store().confirmed().len(), 52);
}

#[test]
fn refresh_through_the_handle_replaces_the_items() {
    let handle = SessionHandle::new(loaded(fixed_options(), 0..100, true));
    let source = Numbers::new(20, 20);

    let report = block_on(handle.refresh(&source));
    assert!(matches!(
        report,
        Some(LoadReport::Appended {
            appended: 20,
            exhausted: true
        })
    ));
    assert_eq!(source.calls.get(), 1);
    assert_eq!(handle.session().view().len(), 20);
    assert!(handle.session().loader().is_exhausted());
}
