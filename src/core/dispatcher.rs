//! Execution Dispatcher：执行已批准的命令
//!
//! 只接受 Approval Gate 交出的 ApprovedCommand，不从显示内容重新推导命令；
//! 先做本地危险关键字拦截，再调用 Executor；每次调用输出结构化审计日志（JSON）。失败不自动重试。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::core::approval::ApprovedCommand;
use crate::core::error::ExecutionError;
use crate::core::types::{ExecutionResult, Outcome};
use crate::remote::Executor;

#[derive(Clone)]
pub struct ExecutionDispatcher {
    executor: Arc<dyn Executor>,
    forbidden_keywords: Vec<String>,
}

impl ExecutionDispatcher {
    pub fn new(executor: Arc<dyn Executor>, forbidden_keywords: Vec<String>) -> Self {
        let forbidden_keywords = forbidden_keywords
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| k.to_lowercase())
            .collect();
        Self {
            executor,
            forbidden_keywords,
        }
    }

    fn check_forbidden(&self, command: &str) -> Result<(), ExecutionError> {
        let lower = command.to_lowercase();
        match self.forbidden_keywords.iter().find(|k| lower.contains(k.as_str())) {
            Some(keyword) => Err(ExecutionError::Forbidden(keyword.trim().to_string())),
            None => Ok(()),
        }
    }

    pub async fn execute(&self, approved: ApprovedCommand) -> Result<ExecutionResult, ExecutionError> {
        let start = Instant::now();
        let result = match self.check_forbidden(approved.command()) {
            Ok(()) => {
                self.executor
                    .run_action(approved.command(), approved.device())
                    .await
            }
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ExecutionError::Forbidden(_)) => "forbidden",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "execution_audit",
            "approval_id": approved.id().to_string(),
            "device": approved.device(),
            "command": approved.command(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "dispatch");

        let output = result?;
        Ok(ExecutionResult {
            outcome: Outcome::Ok,
            output,
            error_detail: None,
            approval_id: approved.id(),
            device: approved.device().to_string(),
            command: approved.command().to_string(),
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::approval::ApprovalGate;
    use crate::core::types::{Device, PlanStep};
    use crate::remote::{InMemoryBackend, SessionBackend};

    fn approve(action: &str, device: &Device) -> ApprovedCommand {
        let mut gate = ApprovalGate::new();
        gate.bind(&PlanStep::new("why", action), device);
        gate.approve(device).unwrap()
    }

    async fn backend() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new().with_user("admin", "admin"));
        backend.login("admin", "admin").await.unwrap();
        backend
    }

    fn keywords() -> Vec<String> {
        crate::config::ExecutorSection::default().forbidden_keywords
    }

    #[tokio::test]
    async fn test_execute_success() {
        let backend = backend().await;
        backend.push_execution(Ok("file1\nfile2".to_string()));
        let dispatcher = ExecutionDispatcher::new(backend.clone(), keywords());
        let d1 = Device::new("D1", "pi");

        let approved = approve("ls /home/pi", &d1);
        let id = approved.id();
        let result = dispatcher.execute(approved).await.unwrap();
        assert_eq!(result.outcome, Outcome::Ok);
        assert_eq!(result.output, "file1\nfile2");
        assert_eq!(result.approval_id, id);
        assert_eq!(
            backend.executed(),
            vec![("ls /home/pi".to_string(), "D1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_forbidden_keyword_never_reaches_executor() {
        let backend = backend().await;
        let dispatcher = ExecutionDispatcher::new(backend.clone(), keywords());
        let d1 = Device::new("D1", "pi");

        let err = dispatcher
            .execute(approve("sudo REBOOT now", &d1))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::Forbidden("reboot".to_string()));
        assert!(backend.executed().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_is_not_retried() {
        let backend = backend().await;
        backend.push_execution(Err(ExecutionError::Remote {
            detail: "Connection refused".to_string(),
            output: None,
        }));
        let dispatcher = ExecutionDispatcher::new(backend.clone(), keywords());
        let d1 = Device::new("D1", "pi");

        let err = dispatcher.execute(approve("uptime", &d1)).await.unwrap_err();
        assert_eq!(err.to_string(), "Connection refused");
        assert_eq!(backend.executed().len(), 1);
    }
}
