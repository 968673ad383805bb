use std::process::ExitCode;

use parred::{
    Runtime,
    cpu::{CpuDevice, CpuRuntime},
    load_run_config,
    reduce::ReductionRun,
};

fn main() -> ExitCode {
    env_logger::init();

    let config = match load_run_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    let client = CpuRuntime::client(&CpuDevice);
    match ReductionRun::new(config).execute::<CpuRuntime>(&client) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
