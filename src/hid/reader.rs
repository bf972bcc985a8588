//! Edge detection over polled input reports

use deckhand_protocol::{capabilities_for, DeviceModel, RawInputReport};

/// One state transition derived from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEdge {
    Pressed(usize),
    Released(usize),
    EncoderPressed(usize),
    EncoderReleased(usize),
    Twisted { index: usize, delta: i8 },
    TouchPressed { x: u16, y: u16 },
    TouchLongPressed { x: u16, y: u16 },
    TouchSwiped { from: (u16, u16), to: (u16, u16) },
}

/// Diff engine owned by one reading loop.
///
/// Keeps the last key and encoder snapshots; every call compares the new
/// snapshot against them and then overwrites them.
#[derive(Debug, Clone)]
pub struct InputReader {
    previous_buttons: Vec<bool>,
    previous_encoders: Vec<bool>,
}

impl InputReader {
    pub fn new(key_count: usize, encoder_count: usize) -> Self {
        Self {
            previous_buttons: vec![false; key_count],
            previous_encoders: vec![false; encoder_count],
        }
    }

    pub fn for_model(model: DeviceModel) -> Self {
        let caps = capabilities_for(model);
        Self::new(caps.key_count, caps.encoder_count)
    }

    pub fn process(&mut self, report: &RawInputReport) -> Vec<InputEdge> {
        match report {
            RawInputReport::ButtonStates(states) => diff(
                &mut self.previous_buttons,
                states,
                InputEdge::Pressed,
                InputEdge::Released,
            ),
            RawInputReport::EncoderStates(states) => diff(
                &mut self.previous_encoders,
                states,
                InputEdge::EncoderPressed,
                InputEdge::EncoderReleased,
            ),
            RawInputReport::EncoderTwist(deltas) => deltas
                .iter()
                .enumerate()
                .filter(|(_, delta)| **delta != 0)
                .map(|(index, &delta)| InputEdge::Twisted { index, delta })
                .collect(),
            RawInputReport::TouchPress { x, y } => vec![InputEdge::TouchPressed { x: *x, y: *y }],
            RawInputReport::TouchLongPress { x, y } => {
                vec![InputEdge::TouchLongPressed { x: *x, y: *y }]
            }
            RawInputReport::TouchSwipe {
                start_x,
                start_y,
                end_x,
                end_y,
            } => vec![InputEdge::TouchSwiped {
                from: (*start_x, *start_y),
                to: (*end_x, *end_y),
            }],
        }
    }
}

fn diff(
    previous: &mut [bool],
    current: &[bool],
    pressed: fn(usize) -> InputEdge,
    released: fn(usize) -> InputEdge,
) -> Vec<InputEdge> {
    let mut edges = Vec::new();
    for (index, (old, &new)) in previous.iter_mut().zip(current).enumerate() {
        if *old != new {
            edges.push(if new { pressed(index) } else { released(index) });
            *old = new;
        }
    }
    edges
}
