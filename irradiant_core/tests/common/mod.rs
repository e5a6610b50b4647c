#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use irradiant_core::{
    AxisLimits, DoseMatrix, Executor, ExecutorBuilder, Lut, LutSettings, OutputCfg, PrintJob,
    PrintParams, ScanGeometry, SettleCfg,
};
use irradiant_hardware::{DaqFault, DaqLogHandle, SimulatedDaq, SimulatedStage};
use irradiant_traits::test_clock::TestClock;

pub fn settle_cfg() -> SettleCfg {
    SettleCfg {
        poll: Duration::from_millis(1),
        duration: Duration::from_millis(5),
        tolerance_nm: 5.0,
        timeout: Duration::from_millis(200),
    }
}

pub fn limits() -> AxisLimits {
    AxisLimits {
        min_nm: -5_000_000.0,
        max_nm: 5_000_000.0,
    }
}

/// LUT from the reference scenario: 0.5 maps to 1.5.
pub fn reference_lut() -> Lut {
    Lut::new(
        &[(0.0, 0.0), (0.5, 1.5), (1.0, 3.0)],
        LutSettings {
            voltage_range: (0.0, 3.0),
            ..LutSettings::default()
        },
    )
    .unwrap()
}

/// Geometry whose flyback is exactly two samples at 5 us dwell.
pub fn two_sample_blanking() -> ScanGeometry {
    ScanGeometry {
        mirror_recovery_us: 10.0,
        ..ScanGeometry::default()
    }
}

pub fn job(matrix: DoseMatrix, lut: Lut, params: PrintParams) -> PrintJob {
    PrintJob {
        matrix: Arc::new(matrix),
        lut: Arc::new(lut),
        geometry: two_sample_blanking(),
        params,
    }
}

pub struct Rig {
    pub clock: TestClock,
    pub stage: Arc<SimulatedStage>,
    pub daq_log: DaqLogHandle,
    pub executor: Executor,
}

pub fn rig(fault: DaqFault) -> Rig {
    rig_with(fault, Duration::from_millis(1), settle_cfg())
}

pub fn rig_with(fault: DaqFault, tau: Duration, settle: SettleCfg) -> Rig {
    let clock = TestClock::new();
    let stage = Arc::new(
        SimulatedStage::with_clock("Z", Arc::new(clock.clone())).with_time_constant(tau),
    );
    let daq = SimulatedDaq::with_clock(Arc::new(clock.clone())).with_fault(fault);
    let daq_log = daq.log();
    let executor = ExecutorBuilder::new()
        .stage(stage.clone())
        .limits(limits())
        .settle(settle)
        .output(Arc::new(Mutex::new(daq)))
        .output_cfg(OutputCfg::default())
        .clock(Arc::new(clock.clone()))
        .try_build()
        .unwrap();
    Rig {
        clock,
        stage,
        daq_log,
        executor,
    }
}
