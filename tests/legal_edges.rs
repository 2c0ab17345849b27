//! Explores every bounded interleaving of pointer, timer, pin and drag events
//! and checks that only table edges are ever taken, including geometry
//! fallbacks.

use edge_dock::displays::StaticDisplays;
use edge_dock::executor::RecordingSink;
use edge_dock::geometry::{Rect, ScreenMetrics};
use edge_dock::machine::{MachineConfig, VisibilityMachine, VisibilityState};
use edge_dock::pointer::PointerSample;
use edge_dock::timer::ManualClock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Event {
    Band,
    Inside,
    Outside,
    PressInBand,
    HideDelayElapses,
    RecheckElapses,
    Pin,
    Unpin,
    Toggle,
    DragOffscreen,
}

const EVENTS: [Event; 10] = [
    Event::Band,
    Event::Inside,
    Event::Outside,
    Event::PressInBand,
    Event::HideDelayElapses,
    Event::RecheckElapses,
    Event::Pin,
    Event::Unpin,
    Event::Toggle,
    Event::DragOffscreen,
];

const DEPTH: u32 = 5;

type Edges = Arc<Mutex<Vec<(VisibilityState, VisibilityState)>>>;

fn build() -> (VisibilityMachine, RecordingSink, ManualClock, Edges) {
    let displays = Arc::new(StaticDisplays::single(1920, 1080));
    let sink = RecordingSink::validating(displays.clone());
    let clock = ManualClock::default();
    let mut machine = VisibilityMachine::new(
        MachineConfig::default(),
        ScreenMetrics::new(Rect::new(0, 0, 1920, 1080), 5),
        Box::new(sink.clone()),
        displays,
        Arc::new(clock.clone()),
    );
    let edges: Edges = Arc::default();
    let log = edges.clone();
    machine.set_listener(Box::new(move |from: VisibilityState, to: VisibilityState| {
        log.lock().unwrap().push((from, to));
    }));
    machine.start();
    (machine, sink, clock, edges)
}

fn apply(machine: &mut VisibilityMachine, clock: &ManualClock, event: Event) {
    match event {
        Event::Band => machine.on_pointer(PointerSample::at_point(2, 500, false)),
        Event::Inside => machine.on_pointer(PointerSample::at_point(800, 500, true)),
        Event::Outside => machine.on_pointer(PointerSample::at_point(1700, 50, false)),
        Event::PressInBand => machine.on_pointer(PointerSample {
            pressed: true,
            ..PointerSample::at_point(2, 500, true)
        }),
        Event::HideDelayElapses => {
            clock.advance(Duration::from_millis(2000));
            machine.fire_due_timers();
        }
        Event::RecheckElapses => {
            clock.advance(Duration::from_millis(250));
            machine.fire_due_timers();
        }
        Event::Pin => machine.pin(),
        Event::Unpin => machine.unpin(),
        Event::Toggle => machine.toggle(),
        // Lands on no connected display.
        Event::DragOffscreen => machine.set_pinned_position(2500, 100),
    }
}

fn sequence(mut index: usize, len: u32) -> Vec<Event> {
    (0..len)
        .map(|_| {
            let e = EVENTS[index % EVENTS.len()];
            index /= EVENTS.len();
            e
        })
        .collect()
}

#[test]
fn every_interleaving_follows_table_edges() {
    let total = EVENTS.len().pow(DEPTH);
    let mut reached = std::collections::HashSet::new();

    for index in 0..total {
        let events = sequence(index, DEPTH);
        let (mut machine, sink, clock, edges) = build();

        for event in &events {
            apply(&mut machine, &clock, *event);

            let state = machine.state();
            reached.insert(state);
            if state == VisibilityState::Pinned {
                assert!(
                    !machine.hide_pending() && !machine.recheck_pending(),
                    "auto-hide timer pending while pinned after {events:?}"
                );
            }
        }

        for (from, to) in edges.lock().unwrap().iter() {
            assert!(
                from.can_transition_to(*to),
                "illegal edge {from:?} -> {to:?} after {events:?}"
            );
        }
        let states = sink.states();
        for pair in states.windows(2) {
            assert!(
                pair[0] == pair[1] || pair[0].can_transition_to(pair[1]),
                "executor asked for {:?} -> {:?} after {events:?}",
                pair[0],
                pair[1]
            );
        }
    }

    assert_eq!(reached.len(), 4, "all four states reachable");
}

#[test]
fn hidden_never_jumps_to_pinned() {
    assert!(!VisibilityState::Hidden.can_transition_to(VisibilityState::Pinned));
    assert!(!VisibilityState::Pinned.can_transition_to(VisibilityState::Hidden));
    assert!(!VisibilityState::Hidden.can_transition_to(VisibilityState::Visible));
    assert!(!VisibilityState::Pinned.can_transition_to(VisibilityState::Peek));
}
