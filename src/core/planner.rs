//! Plan Requester：把目标与设备身份交给 Planner，取回有序计划
//!
//! 前置条件（已选设备、目标非空）在发出任何网络请求之前检查；失败原样上报，不自动重试。

use std::sync::Arc;

use crate::core::error::PlanError;
use crate::core::types::{Device, Plan};
use crate::remote::Planner;

/// 检查计划请求的前置条件，返回去掉首尾空白的目标与已选设备
pub fn validate_request<'a>(
    goal: &'a str,
    device: Option<&'a Device>,
) -> Result<(&'a str, &'a Device), PlanError> {
    let device = device.ok_or(PlanError::NoDeviceSelected)?;
    let goal = goal.trim();
    if goal.is_empty() {
        return Err(PlanError::EmptyGoal);
    }
    Ok((goal, device))
}

#[derive(Clone)]
pub struct PlanRequester {
    planner: Arc<dyn Planner>,
}

impl PlanRequester {
    pub fn new(planner: Arc<dyn Planner>) -> Self {
        Self { planner }
    }

    pub async fn request_plan(&self, goal: &str, device: Option<&Device>) -> Result<Plan, PlanError> {
        let (goal, device) = validate_request(goal, device)?;
        tracing::info!(device = %device.identifier, goal = %goal, "requesting plan");
        let result = self.planner.request_plan(goal, device).await;
        match &result {
            Ok(plan) => tracing::info!(device = %device.identifier, steps = plan.len(), "plan received"),
            Err(e) => tracing::warn!(device = %device.identifier, error = %e, "plan request failed"),
        }
        result
    }
}
