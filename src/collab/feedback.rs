//! interactive 模式的轮末反馈

use std::sync::Arc;

use crate::collab::types::Feedback;
use crate::worker::WorkerResult;

/// 为每个参与者生成一条反馈：成功的同伴记为 appreciation，失败的同伴记为 concern
pub fn round_feedback(participants: &[String], round: &[Arc<WorkerResult>]) -> Vec<Feedback> {
    participants
        .iter()
        .map(|from| {
            let mut feedback = Feedback {
                from_worker: from.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
                suggestions: Vec::new(),
                appreciations: Vec::new(),
                concerns: Vec::new(),
            };
            for peer in round.iter().filter(|r| &r.worker != from) {
                if peer.is_success() {
                    feedback
                        .appreciations
                        .push(format!("{}: {}", peer.worker, peer.kind));
                } else {
                    feedback.concerns.push(format!(
                        "{}: {}",
                        peer.worker,
                        peer.error_message().unwrap_or("failed")
                    ));
                    feedback
                        .suggestions
                        .push(format!("retry {} next round", peer.worker));
                }
            }
            feedback
        })
        .collect()
}
