//! Scheduled Queue (C3) behavior: pulse ordering and tie-break rules
//! (spec.md §4.3).

use genseq_bridge::{Event, Pulse, ScheduledQueue};

fn note_on(pitch: u8) -> Event {
    Event::NoteOn {
        channel: 0,
        pitch,
        velocity: 100,
    }
}

fn note_off(pitch: u8) -> Event {
    Event::NoteOff {
        channel: 0,
        pitch,
        velocity: 0,
    }
}

#[test]
fn drains_in_ascending_pulse_order() {
    let q = ScheduledQueue::new();
    q.push_many([(30, note_on(1)), (10, note_on(2)), (20, note_on(3))]);
    let drained = q.drain_due(30);
    let pulses: Vec<Pulse> = drained.iter().map(|(p, _)| *p).collect();
    assert_eq!(pulses, vec![10, 20, 30]);
}

#[test]
fn drain_due_is_idempotent_with_no_intervening_push() {
    let q = ScheduledQueue::new();
    q.push_many([(10, note_on(1))]);
    assert_eq!(q.drain_due(10).len(), 1);
    assert!(q.drain_due(10).is_empty());
}

#[test]
fn only_due_entries_are_drained() {
    let q = ScheduledQueue::new();
    q.push_many([(10, note_on(1)), (20, note_on(2))]);
    let drained = q.drain_due(15);
    assert_eq!(drained.len(), 1);
    assert_eq!(q.size(), 1);
}

#[test]
fn tie_break_preserves_insertion_order_note_off_before_note_on() {
    let q = ScheduledQueue::new();
    // Caller ensures note-off precedes note-on at equal pulse within a batch.
    q.push_many([(100, note_off(60)), (100, note_on(60))]);
    let drained = q.drain_due(100);
    assert_eq!(drained[0].1, note_off(60));
    assert_eq!(drained[1].1, note_on(60));
}

#[test]
fn ties_across_batches_preserve_submission_order() {
    let q = ScheduledQueue::new();
    q.push_many([(50, note_on(1))]);
    q.push_many([(50, note_on(2))]);
    let drained = q.drain_due(50);
    assert_eq!(drained[0].1, note_on(1));
    assert_eq!(drained[1].1, note_on(2));
}

#[test]
fn clear_discards_everything() {
    let q = ScheduledQueue::new();
    q.push_many([(10, note_on(1)), (20, note_on(2))]);
    q.clear();
    assert_eq!(q.size(), 0);
    assert!(q.drain_due(100).is_empty());
}
