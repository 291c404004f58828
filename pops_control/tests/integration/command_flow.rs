//! Integration test: inbound command bytes through decode, parameter update
//! and the components each effect reaches.

use pops_common::config::PopsConfig;
use pops_common::hal::driver::HardwareDriver;
use pops_common::types::ParticleEvent;
use pops_control::analog::{AnalogInputReader, AnalogOutputController, concentration};
use pops_control::binning::Histogram;
use pops_control::command::{ChannelKind, CommandBuffer, CommandEffect, LiveParams};
use pops_hal::drivers::simulation::SimulationDriver;

// ── Helpers ─────────────────────────────────────────────────────────

struct Bench {
    config: PopsConfig,
    params: LiveParams,
    buffer: CommandBuffer,
}

impl Bench {
    fn new() -> Self {
        let config = PopsConfig::default();
        Self {
            params: LiveParams::from_config(&config),
            buffer: CommandBuffer::new(),
            config,
        }
    }

    fn send(&mut self, bytes: &[u8], kind: ChannelKind) -> Option<CommandEffect> {
        self.buffer.load(bytes);
        let effect = self.buffer.dispatch(kind, &mut self.params);
        assert!(self.buffer.is_empty(), "buffer not cleared after {bytes:?}");
        effect
    }
}

fn peaks(values: &[u16]) -> Vec<ParticleEvent> {
    values
        .iter()
        .map(|&peak| ParticleEvent {
            peak,
            width: 10,
            dt_micros: 100,
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn bin_commands_rebuild_the_histogram() {
    let mut bench = Bench::new();
    let mut histogram = Histogram::from_config(&bench.config.bins);
    assert_eq!(histogram.nbins(), 8);

    let cases: [(&[u8], Option<CommandEffect>); 4] = [
        (b"nbins=10", Some(CommandEffect::BinsChanged)),
        (b"logmin=1", Some(CommandEffect::BinsChanged)),
        (b"logmax=4", Some(CommandEffect::BinsChanged)),
        (b"nbins=500", None),
    ];
    for (cmd, expected) in cases {
        let effect = bench.send(cmd, ChannelKind::Text);
        assert_eq!(effect, expected, "{cmd:?}");
        if effect == Some(CommandEffect::BinsChanged) {
            let p = &bench.params;
            histogram.set_layout(p.nbins, p.logmin, p.logmax);
        }
    }
    assert_eq!(histogram.nbins(), 10);

    // log10 edges at 1.0, 1.3, 1.6, ... 4.0
    histogram.calc_histogram(&peaks(&[10, 25, 1_000, 9_999, 10_000, 5]));
    assert_eq!(histogram.bins()[0], 1);
    assert_eq!(histogram.bins()[1], 1);
    assert_eq!(histogram.bins()[6], 1);
    assert_eq!(histogram.bins()[9], 1);
    assert_eq!(histogram.total(), 4);
}

#[test]
fn analog_output_command_drives_the_dac() {
    let mut bench = Bench::new();
    let (mut driver, probe) = SimulationDriver::with_probe();
    driver
        .init(&bench.config.hardware, &bench.config.timing)
        .unwrap();
    let mut outputs = AnalogOutputController::from_config(&bench.config.analog_outputs);

    let effect = bench.send(b"AO1=2.5", ChannelKind::Text).unwrap();
    let CommandEffect::SetAnalogOutput { channel, volts } = effect else {
        panic!("unexpected effect {effect:?}");
    };
    outputs.set_target(channel, volts);
    let code = outputs.apply(channel, volts, &mut driver).unwrap();
    assert_eq!(code, 2048);
    assert_eq!(probe.analog_output(1), 2048);
    assert_eq!(outputs.set_points(), [0.0, 2.5]);

    // Above full scale the set-point clamps and the code saturates.
    outputs.set_target(0, 9.0);
    assert_eq!(outputs.apply(0, 9.0, &mut driver).unwrap(), 4095);
    assert_eq!(outputs.output(0).set_v, 5.0);

    outputs.zero_all(&mut driver).unwrap();
    assert_eq!(probe.analog_output(0), 0);
    assert_eq!(probe.analog_output(1), 0);
}

#[test]
fn external_flow_sets_the_concentration_basis() {
    let mut bench = Bench::new();
    let mut inputs = AnalogInputReader::new(
        &bench.config.analog_inputs,
        bench.config.flow,
        true,
    );
    assert_eq!(inputs.flow(), 3.0);

    let effect = bench.send(b"LFE_150_extra", ChannelKind::Digit);
    assert_eq!(effect, Some(CommandEffect::ExternalFlow(2.5)));
    inputs.set_external_flow(2.5);

    // Reading the hardware leaves an external flow untouched.
    let mut driver = SimulationDriver::new();
    inputs.read(&mut driver).unwrap();
    assert_eq!(inputs.flow(), 2.5);
    assert_eq!(concentration(500, inputs.flow()), 200.0);
    assert_eq!(concentration(500, 0.0), 0.0);
}

#[test]
fn status_link_session() {
    let mut bench = Bench::new();
    assert_eq!(bench.send(b"3", ChannelKind::Digit), Some(CommandEffect::ParamsChanged));
    assert_eq!(bench.params.skip_save, 4);
    assert_eq!(bench.send(b"0", ChannelKind::Digit), Some(CommandEffect::NewFile));
    assert_eq!(bench.send(b"7", ChannelKind::Digit), None);
    // Text commands mean nothing on a status link.
    assert_eq!(bench.send(b"nbins=4", ChannelKind::Digit), None);
    assert_eq!(bench.params.nbins, 8);
    assert_eq!(bench.send(b"9", ChannelKind::Digit), Some(CommandEffect::Reboot));
    assert_eq!(bench.send(b"8", ChannelKind::Digit), Some(CommandEffect::Shutdown));
}

#[test]
fn full_link_session() {
    let mut bench = Bench::new();
    let session: [&[u8]; 7] = [
        b"Skip=2",
        b"TH_mult=3.5",
        b"MinPts=8",
        b"MaxPts=120",
        b"BLStart=2250",
        b"RawPts=900",
        b"ViewRaw=-1",
    ];
    for cmd in session {
        assert_eq!(
            bench.send(cmd, ChannelKind::Text),
            Some(CommandEffect::ParamsChanged),
            "{cmd:?}"
        );
    }
    let p = &bench.params;
    assert_eq!(p.skip_save, 2);
    assert_eq!(p.th_mult, 3.5);
    assert_eq!(p.min_peak_pts, 8);
    assert_eq!(p.max_peak_pts, 120);
    assert_eq!(p.bl_start, 2250);
    assert_eq!(p.raw_pts, 512);
    assert!(!p.raw_view);

    assert_eq!(bench.send(b"Reboot", ChannelKind::Text), Some(CommandEffect::Reboot));
    assert_eq!(bench.send(b"skip=2", ChannelKind::Text), None);
}
