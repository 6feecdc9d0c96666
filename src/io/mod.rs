pub mod case_data;
pub mod population;
pub mod run_log;
