use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use xshaper::config::{Batches, RingSizes, ShaperConfig};
use xshaper::simulator::{simulate, SimDriver, SimLink};
use xshaper::Shaper;

fn config(frames: u32, ring: u32, delay: Duration, drop_nth: u32) -> ShaperConfig {
    let mut config = ShaperConfig::new("sim0");
    config.delay = delay;
    config.drop_nth = drop_nth;
    config.frame_size = 2048;
    config.frame_count = frames;
    config.rings = RingSizes {
        rx: ring,
        tx: ring,
        fill: ring,
        completion: ring,
    };
    config.batches = Batches {
        rx: 64,
        tx: 64,
        completion: 64,
    };
    config.idle_timeout = Duration::from_millis(1);
    config
}

/// Every frame is in exactly one place.
fn assert_partition(shaper: &Shaper<SimLink>, driver: &SimDriver) {
    let rings = shaper.ring_occupancy();
    let accounted = shaper.frames_free()
        + rings.fill as usize
        + driver.held()
        + rings.rx as usize
        + shaper.frames_pending()
        + rings.tx as usize
        + rings.completion as usize;
    assert_eq!(accounted, shaper.frames_total(), "frames lost or duplicated: {rings:?}");
}

fn packet(seq: u32) -> Vec<u8> {
    let mut bytes = vec![0xAB; 60];
    bytes[..4].copy_from_slice(&seq.to_be_bytes());
    bytes
}

#[test]
fn test_initial_fill_keeps_leftovers_in_pool() {
    let (shaper, driver) = simulate(&config(64, 32, Duration::from_millis(10), 10)).unwrap();
    assert_eq!(driver.fill_outstanding(), 32);
    assert_eq!(shaper.frames_free(), 32);
    assert_partition(&shaper, &driver);
}

#[test]
fn test_drop_every_packet_never_delays() {
    let (mut shaper, mut driver) = simulate(&config(32, 32, Duration::from_millis(10), 1)).unwrap();
    let t0 = Instant::now();

    for seq in 0..10 {
        assert!(driver.deliver(&packet(seq)).is_some());
    }
    let outcome = shaper.step_at(t0).unwrap();

    assert_eq!(outcome.received, 10);
    assert_eq!(outcome.dropped, 10);
    assert_eq!(outcome.delayed, 0);
    assert_eq!(shaper.frames_pending(), 0);
    // Dropped frames went straight back to the driver.
    assert_eq!(driver.fill_outstanding(), 10);
    assert_eq!(shaper.stats().parked, 0);
    assert_partition(&shaper, &driver);

    shaper.step_at(t0 + Duration::from_secs(1)).unwrap();
    assert!(driver.transmit(64).is_empty());
}

#[test]
fn test_each_packet_waits_its_full_delay() {
    let delay = Duration::from_millis(5);
    let ms = Duration::from_millis(1);
    let (mut shaper, mut driver) = simulate(&config(32, 32, delay, 0)).unwrap();
    let t0 = Instant::now();

    let mut arrived = Vec::new();
    for i in 0..3u32 {
        arrived.push(driver.deliver(&packet(i)).unwrap());
        shaper.step_at(t0 + ms * i).unwrap();
        assert!(driver.transmit(64).is_empty());
    }

    shaper.step_at(t0 + ms * 4).unwrap();
    assert!(driver.transmit(64).is_empty());

    for (i, addr) in arrived.iter().enumerate() {
        let outcome = shaper.step_at(t0 + ms * (5 + i as u32)).unwrap();
        assert_eq!(outcome.transmitted, 1);
        let sent = driver.transmit(64);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].addr, *addr);
        assert_partition(&shaper, &driver);
    }
}

#[test]
fn test_drops_tenth_and_twentieth_of_twenty_five() {
    let delay = Duration::from_millis(10);
    let (mut shaper, mut driver) = simulate(&config(32, 32, delay, 10)).unwrap();
    let t0 = Instant::now();

    let arrived: Vec<u64> = (0..25).map(|seq| driver.deliver(&packet(seq)).unwrap()).collect();
    let held_before = driver.held();

    let outcome = shaper.step_at(t0).unwrap();
    assert_eq!(outcome.received, 25);
    assert_eq!(outcome.dropped, 2);
    assert_eq!(outcome.delayed, 23);
    assert_eq!(shaper.frames_pending(), 23);
    assert_partition(&shaper, &driver);

    // The two dropped frames are the only new Fill entries.
    assert_eq!(driver.absorb_fill(64), 2);
    let returned: Vec<u64> = driver.posted_addresses().skip(held_before).collect();
    assert_eq!(returned, vec![arrived[9], arrived[19]]);

    assert_eq!(shaper.step_at(t0 + delay - Duration::from_nanos(1)).unwrap().transmitted, 0);
    assert_eq!(shaper.step_at(t0 + delay).unwrap().transmitted, 23);

    let sent: BTreeSet<u64> = driver.transmit(64).iter().map(|d| d.addr).collect();
    let expected: BTreeSet<u64> = arrived
        .iter()
        .enumerate()
        .filter(|(i, _)| (i + 1) % 10 != 0)
        .map(|(_, addr)| *addr)
        .collect();
    assert_eq!(sent, expected);
    assert_partition(&shaper, &driver);
}

#[test]
fn test_completions_survive_full_fill_ring() {
    let (mut shaper, mut driver) = simulate(&config(16, 8, Duration::ZERO, 0)).unwrap();
    let t0 = Instant::now();

    for seq in 0..5 {
        driver.deliver(&packet(seq)).unwrap();
    }
    // Refill tops Fill up to capacity from the pool, then all five go out.
    let outcome = shaper.step_at(t0).unwrap();
    assert_eq!(outcome.transmitted, 5);
    assert_eq!(driver.fill_outstanding(), 8);

    let completed: Vec<u64> = driver.transmit(8).iter().map(|d| d.addr).collect();
    assert_eq!(completed.len(), 5);
    assert_eq!(driver.completion_outstanding(), 5);

    // One free Fill slot per iteration: one completion reclaimed each time.
    for round in 1..=5u32 {
        assert_eq!(driver.absorb_fill(1), 1);
        let outcome = shaper.step_at(t0).unwrap();
        assert_eq!(outcome.reclaimed, 1, "round {round}");
        assert_eq!(driver.completion_outstanding(), 5 - round);
        assert_partition(&shaper, &driver);
    }
    assert_eq!(shaper.stats().reclaimed, 5);
    assert!(shaper.stats().fill_backpressure > 0);

    // Fill now ends with the completed frames, in completion order.
    let held_before = driver.held();
    driver.absorb_fill(8);
    let tail: Vec<u64> = driver.posted_addresses().skip(held_before + 3).collect();
    assert_eq!(tail, completed);
}

#[test]
fn test_dropped_frames_park_when_fill_is_full() {
    let (mut shaper, mut driver) = simulate(&config(64, 32, Duration::from_millis(10), 1)).unwrap();
    let t0 = Instant::now();

    for seq in 0..4 {
        driver.deliver(&packet(seq)).unwrap();
    }
    // The top-up fills the ring from the pool first, so the drops have nowhere to go.
    let outcome = shaper.step_at(t0).unwrap();
    assert_eq!(outcome.dropped, 4);
    assert_eq!(driver.fill_outstanding(), 32);
    assert_eq!(shaper.stats().parked, 4);
    assert_eq!(shaper.frames_free(), 4);
    assert_partition(&shaper, &driver);

    // Once the driver drains Fill the parked frames are offered again.
    driver.absorb_fill(8);
    let outcome = shaper.step_at(t0).unwrap();
    assert_eq!(outcome.refilled, 4);
    assert_eq!(shaper.frames_free(), 0);
    assert_partition(&shaper, &driver);
}

#[test]
fn test_transmit_waits_for_ring_room() {
    let (mut shaper, mut driver) = simulate(&config(64, 8, Duration::ZERO, 0)).unwrap();
    let t0 = Instant::now();

    for seq in 0..8 {
        driver.deliver(&packet(seq)).unwrap();
    }
    assert_eq!(shaper.step_at(t0).unwrap().transmitted, 8);
    for seq in 8..12 {
        driver.deliver(&packet(seq)).unwrap();
    }

    // Transmit ring is full: nothing is reserved, the four stay queued.
    let outcome = shaper.step_at(t0).unwrap();
    assert_eq!(outcome.transmitted, 0);
    assert_eq!(shaper.frames_pending(), 4);
    assert_eq!(driver.tx_outstanding(), 8);
    assert!(shaper.stats().tx_backpressure > 0);

    driver.transmit(2);
    assert_eq!(shaper.step_at(t0).unwrap().transmitted, 2);
    assert_eq!(shaper.frames_pending(), 2);
    assert_partition(&shaper, &driver);
}

#[test]
fn test_partition_holds_under_mixed_traffic() {
    let delay = Duration::from_millis(3);
    let (mut shaper, mut driver) = simulate(&config(64, 16, delay, 3)).unwrap();
    let t0 = Instant::now();

    let mut seq = 0;
    for tick in 0..200u32 {
        let now = t0 + Duration::from_millis(tick as u64);
        for _ in 0..(tick % 5) {
            driver.deliver(&packet(seq));
            seq += 1;
        }
        shaper.step_at(now).unwrap();
        assert_partition(&shaper, &driver);
        driver.transmit(tick % 7);
        assert_partition(&shaper, &driver);
    }

    // Let everything drain.
    let end = t0 + Duration::from_millis(300);
    for _ in 0..64 {
        shaper.step_at(end).unwrap();
        driver.transmit(64);
        driver.absorb_fill(64);
    }
    shaper.step_at(end).unwrap();
    assert_eq!(shaper.frames_pending(), 0);
    assert_eq!(driver.tx_outstanding(), 0);
    assert_eq!(driver.completion_outstanding(), 0);
    assert_partition(&shaper, &driver);

    let stats = shaper.stats();
    assert_eq!(stats.received, shaper.packets_seen());
    assert_eq!(stats.received, stats.dropped + stats.delayed);
    assert_eq!(stats.delayed, stats.transmitted);
    assert_eq!(stats.dropped, stats.received / 3);
}

#[test]
fn test_each_packet_stamped_when_queued() {
    let delay = Duration::from_millis(10);
    let ms = Duration::from_millis(1);
    let (mut shaper, mut driver) = simulate(&config(32, 32, delay, 0)).unwrap();
    let t0 = Instant::now();

    for seq in 0..3 {
        driver.deliver(&packet(seq)).unwrap();
    }
    // The clock moves one millisecond every time it is read.
    let ticks = Cell::new(0u32);
    let clock = || {
        let now = t0 + ms * ticks.get();
        ticks.set(ticks.get() + 1);
        now
    };
    let outcome = shaper.step_with(clock).unwrap();
    assert_eq!(outcome.delayed, 3);
    assert_eq!(ticks.get(), 4);

    // Stamped at t0, t0+1ms and t0+2ms.
    assert_eq!(shaper.step_at(t0 + delay + ms).unwrap().transmitted, 2);
    assert_eq!(shaper.step_at(t0 + delay + ms * 2).unwrap().transmitted, 1);
    assert_partition(&shaper, &driver);
}

#[test]
fn test_payload_is_untouched() {
    let (mut shaper, mut driver) = simulate(&config(32, 32, Duration::ZERO, 0)).unwrap();
    driver.deliver(b"hello, shaper").unwrap();
    shaper.step_at(Instant::now()).unwrap();

    let sent = driver.transmit(1);
    assert_eq!(sent.len(), 1);
    assert_eq!(driver.payload(&sent[0]), Some(&b"hello, shaper"[..]));
}

#[test]
fn test_doorbells_follow_need_wakeup() {
    let (mut shaper, mut driver) = simulate(&config(32, 32, Duration::ZERO, 2)).unwrap();
    let t0 = Instant::now();

    driver.deliver(&packet(0)).unwrap();
    shaper.step_at(t0).unwrap();
    assert_eq!(driver.tx_kicks(), 0);
    assert_eq!(driver.fill_wakeups(), 0);

    driver.set_tx_need_wakeup(true);
    driver.set_fill_need_wakeup(true);
    driver.deliver(&packet(1)).unwrap(); // dropped: goes back to Fill
    driver.deliver(&packet(2)).unwrap(); // delayed: goes out on Transmit
    let outcome = shaper.step_at(t0).unwrap();
    assert_eq!(outcome.dropped, 1);
    assert_eq!(outcome.transmitted, 1);
    assert_eq!(driver.tx_kicks(), 1);
    assert!(driver.fill_wakeups() >= 1);
    assert_eq!(shaper.stats().tx_kicks, driver.tx_kicks());
    assert_eq!(shaper.stats().fill_wakeups, driver.fill_wakeups());
}

#[test]
fn test_idle_step_reports_idle() {
    let (mut shaper, _driver) = simulate(&config(32, 32, Duration::from_millis(10), 10)).unwrap();
    let outcome = shaper.step_at(Instant::now()).unwrap();
    assert!(outcome.idle);
}

#[test]
fn test_pending_packets_keep_loop_busy() {
    let (mut shaper, mut driver) = simulate(&config(32, 32, Duration::from_millis(10), 0)).unwrap();
    let t0 = Instant::now();
    driver.deliver(&packet(0)).unwrap();
    shaper.step_at(t0).unwrap();

    let outcome = shaper.step_at(t0 + Duration::from_millis(1)).unwrap();
    assert_eq!(outcome.received, 0);
    assert!(!outcome.idle);
    assert_eq!(shaper.next_due(), Some(t0 + Duration::from_millis(10)));
}

#[test]
fn test_run_returns_when_stop_already_set() {
    let (mut shaper, driver) = simulate(&config(32, 32, Duration::from_millis(10), 10)).unwrap();
    let stop = AtomicBool::new(true);
    shaper.run(&stop).unwrap();
    assert_eq!(driver.waits(), 0);
    assert_eq!(shaper.packets_seen(), 0);
}

#[test]
fn test_run_idles_until_stopped() {
    let (mut shaper, driver) = simulate(&config(32, 32, Duration::from_millis(10), 10)).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&stop);
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        flag.store(true, Ordering::Relaxed);
    });

    shaper.run(&stop).unwrap();
    stopper.join().unwrap();

    assert!(driver.waits() > 0);
    assert_eq!(shaper.stats().idle_waits, driver.waits());
}

#[test]
fn test_wall_clock_step_respects_delay() {
    let delay = Duration::from_millis(200);
    let (mut shaper, mut driver) = simulate(&config(32, 32, delay, 0)).unwrap();

    let start = Instant::now();
    driver.deliver(&packet(0)).unwrap();
    shaper.step().unwrap();
    let outcome = shaper.step().unwrap();
    if start.elapsed() < delay {
        assert_eq!(outcome.transmitted, 0);
        assert!(driver.transmit(1).is_empty());
    }
}
