// Example: a session driven by an in-memory data source.
use futures::executor::block_on;
use futures::future::{self, FutureExt, LocalBoxFuture};
use lazylist::{FetchError, ListOptions, Page};
use lazylist_session::{DataSource, ListSession, SessionHandle, SessionOptions};

struct Rows {
    total: u32,
    page_size: u32,
}

impl DataSource<u32, u32> for Rows {
    type Error = FetchError;

    fn fetch(&self, cursor: Option<u32>) -> LocalBoxFuture<'_, Result<Page<u32, u32>, FetchError>> {
        let start = cursor.unwrap_or(0);
        let end = (start + self.page_size).min(self.total);
        println!("fetch {start}..{end}");
        future::ready(Ok(Page::new((start..end).collect(), Some(end), end < self.total)))
            .boxed_local()
    }
}

fn main() {
    let options = SessionOptions::new(ListOptions::fixed(40).with_overscan(3));
    let handle = SessionHandle::new(ListSession::new(options, |row: &u32| *row));
    let source = Rows {
        total: 500,
        page_size: 50,
    };

    block_on(async {
        handle.session_mut().on_viewport(600);
        handle.load_initial(&source).await;
        println!("loaded={} items={:?}", handle.session().view().len(), handle.session().items());

        // Scroll towards the end of the first page; the session fetches the next one.
        let report = handle.scroll(1500, 0, &source).await;
        println!("report={report:?} loaded={}", handle.session().view().len());
        println!("range={:?}", handle.session().range());
    });
}
