//! Hive - 多 Worker 协作核心
//!
//! 入口：初始化日志、加载配置、注册 Worker，执行一次协作并输出会话与系统状态（JSON）。
//!
//! 用法：`hive [request.json]`，请求文件内容为 CollaborationDraft；缺省时运行内置的 autonomous 示例。

use std::path::PathBuf;

use anyhow::Context;
use hive::{load_config, observability, AppConfig, CollaborationDraft, CollaborationService};

fn demo_draft() -> CollaborationDraft {
    CollaborationDraft {
        title: "Collaboration platform".to_string(),
        description: "Plan, design and implement a shared workspace".to_string(),
        mode: "autonomous".to_string(),
        participants: vec![
            "planner".to_string(),
            "designer".to_string(),
            "coder".to_string(),
        ],
        priority: Some("high".to_string()),
        ..CollaborationDraft::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    let service = CollaborationService::from_config(&config);

    let draft = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw).context("Invalid collaboration request")?
        }
        None => demo_draft(),
    };

    let id = service
        .submit_draft(draft)
        .await
        .context("Collaboration request rejected")?;
    let session = service.wait_for(&id).await.context("Session lost")?;

    println!("{}", serde_json::to_string_pretty(&session)?);
    println!("{}", serde_json::to_string_pretty(&service.system_status().await)?);
    Ok(())
}
