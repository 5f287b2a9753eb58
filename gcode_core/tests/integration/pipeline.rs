//! Interpret a line, plan it, generate segments, and step through them
//! end to end, the way the cycle runner does on every tick.

use gcode_common::consts::N_AXIS;
use gcode_common::hal::StepOutput;
use gcode_common::settings::Settings;

use gcode_core::interpreter::Interpreter;
use gcode_core::planner::Planner;
use gcode_core::segment::generate_segments;
use gcode_core::stepper::{StepTickResult, Stepper};

struct RecordingOutput {
    steps: [u32; N_AXIS],
}

impl RecordingOutput {
    fn new() -> Self {
        Self { steps: [0; N_AXIS] }
    }
}

impl StepOutput for RecordingOutput {
    fn set_step(&mut self, axis: usize, asserted: bool) {
        if asserted {
            self.steps[axis] += 1;
        }
    }
    fn set_direction(&mut self, _axis: usize, _negative: bool) {}
    fn set_enable(&mut self, _axis: usize, _enabled: bool) {}
}

#[test]
fn g1_line_drives_the_stepper_for_its_full_step_count() {
    let settings = Settings::default();
    let mut interpreter = Interpreter::new();
    let mut planner = Planner::new();

    interpreter.execute_line("G1 X10 Y5 F500", &settings, &mut planner).expect("plan G1");
    assert_eq!(planner.len(), 1);

    let block = planner.tail_block().cloned().expect("planned block");
    let segments = generate_segments(&block, 0.0);
    assert!(!segments.is_empty());

    let mut output = RecordingOutput::new();
    let mut stepper = Stepper::new(&mut output);
    stepper.load_block(&block);

    let mut completed_segments = 0;
    for segment in &segments {
        stepper.load_segment(segment);
        loop {
            let result = stepper.step_pulse_tick(&block);
            stepper.step_reset_tick();
            if result == StepTickResult::SegmentComplete {
                completed_segments += 1;
                break;
            }
        }
    }

    assert_eq!(completed_segments, segments.len());
    assert_eq!(output.steps[0], block.steps[0]);
    assert_eq!(output.steps[1], block.steps[1]);
}

#[test]
fn incremental_moves_compose_across_two_lines() {
    let settings = Settings::default();
    let mut interpreter = Interpreter::new();
    let mut planner = Planner::new();

    interpreter.execute_line("G91 G1 X10", &settings, &mut planner).expect("first move");
    interpreter.execute_line("G1 X10", &settings, &mut planner).expect("second move");

    assert_eq!(planner.len(), 2);
    assert!((interpreter.position[0] - 20.0).abs() < 1e-3);
}
