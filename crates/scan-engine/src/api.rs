//! One-call entry points.
//!
//! Each builds a [`ScanPlan`] with the command text recorded on the `#S`
//! line and runs it on the context.

use crate::context::ScanContext;
use crate::engine::{ScanPlan, ScanReport};
use crate::trajectory::{PerPoint, ScanParam, TimeLimits};
use scan_core::ScanResult;
use std::time::Duration;

impl ScanContext {
    /// Step `mnemonic` from `start` to `end` in `steps` intervals, counting
    /// `count_time` seconds at each of the `steps + 1` points.
    pub async fn scan(
        &mut self,
        mnemonic: &str,
        start: f64,
        end: f64,
        steps: usize,
        count_time: impl Into<PerPoint>,
    ) -> ScanResult<ScanReport> {
        let count_time = count_time.into();
        let command = format!(
            "scan {mnemonic} {start} {end} {steps} {}",
            per_point_text(&count_time)
        );
        let plan = ScanPlan::scan(vec![ScanParam::linear(mnemonic, start, end, steps)?])
            .with_count_time(count_time)
            .with_command(command);
        self.run(plan).await
    }

    /// Step several devices in lockstep, each over its own `(start, end)` range.
    pub async fn scan_many(
        &mut self,
        axes: &[(&str, f64, f64)],
        steps: usize,
        count_time: impl Into<PerPoint>,
    ) -> ScanResult<ScanReport> {
        let count_time = count_time.into();
        let mut params = Vec::with_capacity(axes.len());
        let mut command = String::from("scan");
        for &(mnemonic, start, end) in axes {
            params.push(ScanParam::linear(mnemonic, start, end, steps)?);
            command.push_str(&format!(" {mnemonic} {start} {end}"));
        }
        command.push_str(&format!(" {steps} {}", per_point_text(&count_time)));
        let plan = ScanPlan::scan(params)
            .with_count_time(count_time)
            .with_command(command);
        self.run(plan).await
    }

    /// Outer-product scan; axes are `(mnemonic, start, end, steps)`, the last
    /// one varying fastest.
    pub async fn mesh(
        &mut self,
        axes: &[(&str, f64, f64, usize)],
        count_time: impl Into<PerPoint>,
    ) -> ScanResult<ScanReport> {
        let count_time = count_time.into();
        let mut params = Vec::with_capacity(axes.len());
        let mut command = String::from("mesh");
        for &(mnemonic, start, end, steps) in axes {
            params.push(ScanParam::linear(mnemonic, start, end, steps)?);
            command.push_str(&format!(" {mnemonic} {start} {end} {steps}"));
        }
        command.push_str(&format!(" {}", per_point_text(&count_time)));
        let plan = ScanPlan::mesh(params)
            .with_count_time(count_time)
            .with_command(command);
        self.run(plan).await
    }

    /// Count repeatedly without moving, until `repeat` points or `duration`
    /// elapsed, whichever comes first. With neither, runs until aborted.
    pub async fn timescan(
        &mut self,
        count_time: impl Into<PerPoint>,
        delay: impl Into<PerPoint>,
        repeat: Option<usize>,
        duration: Option<Duration>,
    ) -> ScanResult<ScanReport> {
        let count_time = count_time.into();
        let delay = delay.into();
        let mut command = format!(
            "timescan {} {}",
            per_point_text(&count_time),
            per_point_text(&delay)
        );
        if let Some(repeat) = repeat {
            command.push_str(&format!(" repeat={repeat}"));
        }
        if let Some(duration) = duration {
            command.push_str(&format!(" duration={}", duration.as_secs_f64()));
        }
        let plan = ScanPlan::time(TimeLimits { repeat, duration })
            .with_count_time(count_time)
            .with_delay(delay)
            .with_command(command);
        self.run(plan).await
    }
}

fn per_point_text(value: &PerPoint) -> String {
    match value {
        PerPoint::Scalar(v) => v.to_string(),
        PerPoint::Values(values) => format!("[{} values]", values.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_point_command_text() {
        assert_eq!(per_point_text(&PerPoint::Scalar(1.0)), "1");
        assert_eq!(per_point_text(&PerPoint::Scalar(-0.5)), "-0.5");
        assert_eq!(per_point_text(&vec![1.0, 2.0].into()), "[2 values]");
    }
}
