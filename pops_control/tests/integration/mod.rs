mod command_flow;
mod control_loop;
mod peak_file;
mod ring_drain;
mod sample_config;
