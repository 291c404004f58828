//! Integration test: the shipped instrument configuration.

use pops_common::config::{ConfigLoader, LinkRole, PopsConfig};
use pops_common::types::{AnalogConversion, StatusType};
use pops_control::analog::AnalogOutputController;
use pops_control::command::LiveParams;

const SAMPLE: &str = include_str!("../../config/POPS_BBB.toml");

#[test]
fn sample_config_parses_and_validates() {
    let mut config = PopsConfig::parse(SAMPLE).unwrap();
    config.normalize();
    config.validate().unwrap();

    assert_eq!(config.status_type(), StatusType::Uav);
    assert_eq!(config.instrument.pops_sn, "POPS-0107");
    assert_eq!(config.bins.nbins, 16);
    assert_eq!(config.analog_inputs.0.len(), 7);
    assert_eq!(config.analog_inputs.0[0].conv, AnalogConversion::Flow);
    assert_eq!(config.analog_inputs.0[6].name, "BatV");
    assert_eq!(config.flow_step.steps.len(), 3);
    assert!(!config.flow_step.enabled);

    assert_eq!(config.serial_ports.0.len(), 2);
    assert!(config.serial_ports.0.iter().all(|p| p.enabled));
    let aircraft = config
        .udp
        .iter()
        .find(|u| u.role == LinkRole::Aircraft)
        .unwrap();
    assert!(!aircraft.enabled);

    let params = LiveParams::from_config(&config);
    assert_eq!(params.th_mult, 3.0);
    assert_eq!(params.raw_pts, 256);
    let outputs = AnalogOutputController::from_config(&config.analog_outputs);
    assert_eq!(outputs.set_points(), [1.6, 2.2]);
}
