// Example: fixed and measured windows, plus the scroll-to helper.
use lazylist::{Align, ListOptions, Virtualizer, fixed_range};

fn main() {
    // 10k rows of 40 units in a 500-unit viewport.
    println!("top={:?}", fixed_range(0, 500, 10_000, 40, 5));
    println!("bottom={:?}", fixed_range(i64::MAX, 500, 10_000, 40, 5));

    let mut v = Virtualizer::new(ListOptions::measured(40).with_overscan(2));
    v.append_keys(0..1_000u64);
    v.set_viewport_extent(500);

    // Rows report their real height after the first layout pass.
    for key in 0..20u64 {
        let height = 30 + (key % 4) as u32 * 10;
        v.measure(&key, height).ok();
    }
    println!("total_extent={}", v.total_extent());
    println!("range={:?}", v.range());

    let off = v.scroll_to_index(999, Align::End);
    println!("after scroll_to_index: offset={off} range={:?}", v.range());
}
