// src/refresh.rs
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::notify::{Notification, Subscription};

/// 触发刷新的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interval,
    Attendance,
}

/// 单个视图的定时刷新任务；Drop 时终止后台任务
pub struct Refresher {
    rx: mpsc::Receiver<Trigger>,
    handle: JoinHandle<()>,
}

impl Refresher {
    /// 第一次触发立即发生 (首屏加载)；
    /// 传入订阅时，考勤通知也会触发刷新
    pub fn spawn(period: Duration, events: Option<Subscription>) -> Self {
        // 容量 1：已有一次刷新待处理时，后续触发直接合并
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(period, events, tx));
        Self { rx, handle }
    }

    /// 等待下一次刷新；任务结束后返回 None
    pub async fn next(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(period: Duration, mut events: Option<Subscription>, tx: mpsc::Sender<Trigger>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => Trigger::Interval,
            note = next_event(&mut events) => match note {
                Some(Notification::Event(e)) => {
                    tracing::debug!("收到考勤通知 {:?}，刷新", e.change);
                    Trigger::Attendance
                }
                Some(Notification::Resync) => Trigger::Attendance,
                None => {
                    tracing::debug!("考勤总线已关闭");
                    events = None;
                    continue;
                }
            },
        };
        match tx.try_send(trigger) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => break,
        }
    }
}

async fn next_event(events: &mut Option<Subscription>) -> Option<Notification> {
    match events {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

/// 请求代次：晚发出的请求先返回后，早请求的结果作废
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    issued: u64,
    accepted: u64,
}

impl Generation {
    /// 发出新请求时取号
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// 结果返回时判断是否仍需采用
    pub fn accept(&mut self, ticket: u64) -> bool {
        if ticket > self.accepted {
            self.accepted = ticket;
            true
        } else {
            false
        }
    }

    pub fn latest(&self) -> u64 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{AttendanceBus, AttendanceChange};

    #[test]
    fn stale_results_are_dropped() {
        let mut gen = Generation::default();
        let first = gen.issue();
        let second = gen.issue();
        assert!(gen.accept(second));
        assert!(!gen.accept(first));
        assert!(!gen.accept(second));
        assert_eq!(gen.latest(), 2);
    }

    #[tokio::test]
    async fn first_tick_is_immediate() {
        let mut r = Refresher::spawn(Duration::from_secs(3600), None);
        let t = tokio::time::timeout(Duration::from_secs(1), r.next()).await;
        assert_eq!(t.unwrap(), Some(Trigger::Interval));
    }

    #[tokio::test]
    async fn attendance_event_triggers_refresh() {
        let bus = AttendanceBus::in_process();
        let sub = bus.subscribe().await;
        let mut r = Refresher::spawn(Duration::from_secs(3600), Some(sub));
        assert_eq!(r.next().await, Some(Trigger::Interval));

        bus.publish(AttendanceChange::BatchUpdated { student_ids: vec![1, 2] })
            .await;
        let t = tokio::time::timeout(Duration::from_secs(1), r.next()).await;
        assert_eq!(t.unwrap(), Some(Trigger::Attendance));
    }

    #[tokio::test]
    async fn stop_ends_the_stream() {
        let mut r = Refresher::spawn(Duration::from_secs(3600), None);
        assert_eq!(r.next().await, Some(Trigger::Interval));
        r.stop();
        let t = tokio::time::timeout(Duration::from_secs(1), r.next()).await;
        assert_eq!(t.unwrap(), None);
    }
}
