// src/notify.rs
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::config::Config;
use crate::prefs::{PrefStore, ATTENDANCE_UPDATE_CHECK, ATTENDANCE_UPDATE_EVENT};

pub const CHANNEL_NAME: &str = "attendance_updates";
const CHANNEL_CAPACITY: usize = 64;

/// 考勤变更内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttendanceChange {
    #[serde(rename = "attendance_updated")]
    Updated {
        #[serde(rename = "attendanceId")]
        attendance_id: i64,
        #[serde(rename = "studentId")]
        student_id: Option<i64>,
    },
    #[serde(rename = "attendance_batch_updated")]
    BatchUpdated {
        #[serde(rename = "studentIds")]
        student_ids: Vec<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    #[serde(flatten)]
    pub change: AttendanceChange,
    /// 毫秒时间戳
    pub timestamp: i64,
    /// 发布方总线 id
    pub origin: Uuid,
}

/// 订阅者收到的通知；两种都意味着“重新拉取”
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Event(AttendanceEvent),
    /// 接收方落后，丢失了若干事件
    Resync,
}

/// 总线传输方式，构建时确定一次
#[derive(Debug, Clone)]
pub enum BusTransport {
    InProcess,
    SharedStore {
        store: PrefStore,
        poll_interval: Duration,
    },
}

impl BusTransport {
    pub fn detect(config: &Config, store: PrefStore) -> Self {
        if config.cross_process_bus {
            tracing::info!("考勤通知使用共享存储轮询 ({}ms)", config.poll_interval.as_millis());
            BusTransport::SharedStore {
                store,
                poll_interval: config.poll_interval,
            }
        } else {
            BusTransport::InProcess
        }
    }
}

#[derive(Debug, Clone)]
enum Inner {
    Local(broadcast::Sender<AttendanceEvent>),
    Shared {
        store: PrefStore,
        poll_interval: Duration,
    },
}

/// 考勤变更总线：写入方发布，看板/账户页订阅
#[derive(Debug, Clone)]
pub struct AttendanceBus {
    id: Uuid,
    inner: Inner,
}

impl AttendanceBus {
    pub fn new(transport: BusTransport) -> Self {
        let inner = match transport {
            BusTransport::InProcess => {
                let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
                Inner::Local(tx)
            }
            BusTransport::SharedStore {
                store,
                poll_interval,
            } => Inner::Shared {
                store,
                poll_interval,
            },
        };
        Self {
            id: Uuid::new_v4(),
            inner,
        }
    }

    pub fn in_process() -> Self {
        Self::new(BusTransport::InProcess)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 发布事件；失败只记日志，不影响调用方
    pub async fn publish(&self, change: AttendanceChange) -> AttendanceEvent {
        let mut event = AttendanceEvent {
            change,
            timestamp: chrono::Utc::now().timestamp_millis(),
            origin: self.id,
        };

        match &self.inner {
            Inner::Local(tx) => {
                // 没有订阅者时 send 返回错误，属于正常情况
                if tx.send(event.clone()).is_err() {
                    tracing::debug!("{}: 暂无订阅者", CHANNEL_NAME);
                }
            }
            Inner::Shared { store, .. } => {
                // 事件与时间戳在同一次写入里落盘；同一毫秒内的连续发布也要让轮询方看到变化
                let stamped = store
                    .update(|map| {
                        let last = map
                            .get(ATTENDANCE_UPDATE_CHECK)
                            .and_then(Value::as_i64)
                            .unwrap_or(0);
                        let mut stamped = event.clone();
                        if stamped.timestamp <= last {
                            stamped.timestamp = last + 1;
                        }
                        map.insert(ATTENDANCE_UPDATE_EVENT.to_owned(), serde_json::to_value(&stamped)?);
                        map.insert(ATTENDANCE_UPDATE_CHECK.to_owned(), Value::from(stamped.timestamp));
                        Ok(stamped)
                    })
                    .await;
                match stamped {
                    Ok(stamped) => event = stamped,
                    Err(e) => tracing::error!("考勤通知写入失败: {}", e),
                }
            }
        }
        tracing::info!("已发送考勤更新通知: {:?}", event.change);
        event
    }

    pub async fn subscribe(&self) -> Subscription {
        match &self.inner {
            Inner::Local(tx) => Subscription {
                inner: SubInner::Local(tx.subscribe()),
            },
            Inner::Shared {
                store,
                poll_interval,
            } => {
                let last_seen = store
                    .get::<i64>(ATTENDANCE_UPDATE_CHECK)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(0);
                let mut ticker = tokio::time::interval(*poll_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                Subscription {
                    inner: SubInner::Shared {
                        store: store.clone(),
                        ticker,
                        last_seen,
                    },
                }
            }
        }
    }
}

pub struct Subscription {
    inner: SubInner,
}

enum SubInner {
    Local(broadcast::Receiver<AttendanceEvent>),
    Shared {
        store: PrefStore,
        ticker: tokio::time::Interval,
        last_seen: i64,
    },
}

impl Subscription {
    /// 等待下一条通知；总线关闭时返回 None
    pub async fn next(&mut self) -> Option<Notification> {
        match &mut self.inner {
            SubInner::Local(rx) => match rx.recv().await {
                Ok(event) => Some(Notification::Event(event)),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("考勤通知积压，丢失 {} 条，改为整体刷新", missed);
                    Some(Notification::Resync)
                }
                Err(RecvError::Closed) => None,
            },
            SubInner::Shared {
                store,
                ticker,
                last_seen,
            } => loop {
                ticker.tick().await;
                let stamp = match store.get::<i64>(ATTENDANCE_UPDATE_CHECK).await {
                    Ok(Some(stamp)) => stamp,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!("读取考勤通知失败: {}", e);
                        continue;
                    }
                };
                if stamp <= *last_seen {
                    continue;
                }
                *last_seen = stamp;
                let event = store
                    .get::<AttendanceEvent>(ATTENDANCE_UPDATE_EVENT)
                    .await
                    .ok()
                    .flatten();
                return Some(match event {
                    Some(e) if e.timestamp == stamp => Notification::Event(e),
                    _ => Notification::Resync,
                });
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_wire_shape() {
        let event = AttendanceEvent {
            change: AttendanceChange::Updated {
                attendance_id: 7,
                student_id: Some(3),
            },
            timestamp: 1000,
            origin: Uuid::nil(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "attendance_updated");
        assert_eq!(value["attendanceId"], 7);
        assert_eq!(value["studentId"], 3);
        assert_eq!(value["timestamp"], 1000);

        let batch: AttendanceEvent = serde_json::from_value(json!({
            "type": "attendance_batch_updated",
            "studentIds": [1, 2],
            "timestamp": 5,
            "origin": Uuid::nil(),
        }))
        .unwrap();
        assert_eq!(
            batch.change,
            AttendanceChange::BatchUpdated {
                student_ids: vec![1, 2]
            }
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_fail() {
        let bus = AttendanceBus::in_process();
        let event = bus
            .publish(AttendanceChange::BatchUpdated { student_ids: vec![] })
            .await;
        assert_eq!(event.origin, bus.id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_publish_keeps_other_prefs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = PrefStore::file(dir.path().join("prefs.json"));
        let bus = AttendanceBus::new(BusTransport::SharedStore {
            store: store.clone(),
            poll_interval: Duration::from_millis(20),
        });

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10i64 {
            let bus = bus.clone();
            tasks.spawn(async move {
                bus.publish(AttendanceChange::Updated {
                    attendance_id: i,
                    student_id: None,
                })
                .await;
            });
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .set(crate::prefs::SCHEDULE_FILTERS, &json!({"week": i}))
                    .await
                    .expect("filters");
            });
        }
        while let Some(done) = tasks.join_next().await {
            done.expect("task");
        }
        store.mark_notices_seen(42).await.expect("seen");

        assert_eq!(store.notice_last_seen().await, 42);
        assert!(store.get_raw(crate::prefs::SCHEDULE_FILTERS).await.unwrap().is_some());
        let stamp: i64 = store.get(ATTENDANCE_UPDATE_CHECK).await.unwrap().expect("stamp");
        let event: AttendanceEvent = store.get(ATTENDANCE_UPDATE_EVENT).await.unwrap().expect("event");
        assert_eq!(event.timestamp, stamp);
    }
}
