// src/timetable/slots.rs
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::models::{TimeSlot, TimeslotRef};
use crate::validation::CLOCK_RE;

pub const DAYS_PER_WEEK: u8 = 7;
pub const DEFAULT_PERIODS: u8 = 8;

pub fn weekday_name(weekday: u8) -> String {
    match weekday {
        1 => "周一".into(),
        2 => "周二".into(),
        3 => "周三".into(),
        4 => "周四".into(),
        5 => "周五".into(),
        6 => "周六".into(),
        7 => "周日".into(),
        other => format!("周{}", other),
    }
}

/// 网格坐标 (星期, 节次)，字符串形式为 `"weekday-index"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub weekday: u8,
    pub index: u8,
}

impl SlotKey {
    /// 星期必须在 1..=7，节次从 1 开始
    pub fn new(weekday: u8, index: u8) -> Option<Self> {
        if (1..=DAYS_PER_WEEK).contains(&weekday) && index >= 1 {
            Some(Self { weekday, index })
        } else {
            None
        }
    }

    pub fn of(slot: &TimeSlot) -> Option<Self> {
        Self::new(slot.weekday, slot.index)
    }

    pub fn to_key(&self) -> String {
        format!("{}-{}", self.weekday, self.index)
    }

    pub fn parse(key: &str) -> Option<Self> {
        let (w, i) = key.split_once('-')?;
        Self::new(w.trim().parse().ok()?, i.trim().parse().ok()?)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.weekday, self.index)
    }
}

impl FromStr for SlotKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid slot key: {}", s))
    }
}

/// 时间段完整性 (周一到周日，每天 1-8 节)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completeness {
    pub expected: usize,
    pub existing: usize,
    pub missing: Vec<SlotKey>,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing_by_weekday(&self) -> BTreeMap<u8, Vec<u8>> {
        let mut grouped: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        for key in &self.missing {
            grouped.entry(key.weekday).or_default().push(key.index);
        }
        for indexes in grouped.values_mut() {
            indexes.sort_unstable();
        }
        grouped
    }

    /// 整天缺失的星期 (这些天无法拖拽排课)
    pub fn fully_missing_weekdays(&self) -> Vec<u8> {
        self.missing_by_weekday()
            .into_iter()
            .filter(|(_, idx)| idx.len() == DEFAULT_PERIODS as usize)
            .map(|(wd, _)| wd)
            .collect()
    }

    /// 多行提示；完整时为 None
    pub fn warning(&self) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        let mut msg = String::from("时间段不完整！缺失的时间段：\n");
        for (wd, indexes) in self.missing_by_weekday() {
            if indexes.len() == DEFAULT_PERIODS as usize {
                msg.push_str(&format!("{}: 完全缺失（所有节次）\n", weekday_name(wd)));
            } else {
                let list: Vec<String> = indexes.iter().map(u8::to_string).collect();
                msg.push_str(&format!("{}: 第{}节\n", weekday_name(wd), list.join("、")));
            }
        }
        msg.push_str("请先生成时间段补充缺失的部分。");
        Some(msg)
    }
}

/// 时间段索引：按坐标与 id 查找，查不到时线性扫描并回填
#[derive(Debug, Clone, Default)]
pub struct SlotIndex {
    slots: Vec<TimeSlot>,
    by_key: HashMap<SlotKey, TimeSlot>,
    by_id: HashMap<i64, TimeSlot>,
    max_index: u8,
    labels: BTreeMap<u8, String>,
}

impl SlotIndex {
    pub fn from_slots(raw: Vec<TimeSlot>) -> Self {
        let mut index = Self::default();
        for slot in raw {
            if slot.id == 0 || SlotKey::of(&slot).is_none() {
                tracing::warn!("跳过无效的时间段数据: {:?}", slot);
                continue;
            }
            index.insert(slot);
        }
        if index.max_index == 0 {
            index.max_index = DEFAULT_PERIODS;
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    /// 网格行数；没有时间段时为 8
    pub fn max_index(&self) -> u8 {
        if self.max_index == 0 {
            DEFAULT_PERIODS
        } else {
            self.max_index
        }
    }

    /// 节次标签：`HH:MM-HH:MM`，没有起止时间时为 `第N节`
    pub fn label(&self, index: u8) -> String {
        self.labels
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("第{}节", index))
    }

    pub fn by_key(&self, key: SlotKey) -> Option<&TimeSlot> {
        self.by_key.get(&key)
    }

    pub fn by_id(&self, id: i64) -> Option<&TimeSlot> {
        self.by_id.get(&id)
    }

    /// 某天已有的节次 (升序)
    pub fn indexes_on(&self, weekday: u8) -> Vec<u8> {
        let mut found: Vec<u8> = self
            .slots
            .iter()
            .filter(|s| s.weekday == weekday)
            .map(|s| s.index)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// 加入或更新一个时间段，同时维护三张索引
    pub fn insert(&mut self, slot: TimeSlot) {
        let Some(key) = SlotKey::of(&slot) else {
            return;
        };
        if slot.index > self.max_index {
            self.max_index = slot.index;
        }
        let label = match (clock(slot.start_time.as_deref()), clock(slot.end_time.as_deref())) {
            (Some(start), Some(end)) => format!("{}-{}", start, end),
            _ => format!("第{}节", slot.index),
        };
        self.labels.insert(slot.index, label);

        if slot.id != 0 {
            match self.slots.iter_mut().find(|s| s.id == slot.id) {
                Some(existing) => *existing = slot.clone(),
                None => self.slots.push(slot.clone()),
            }
            self.by_id.insert(slot.id, slot.clone());
        }
        self.by_key.insert(key, slot);
    }

    /// 先查缓存，再线性扫描；扫描命中时回填缓存
    pub fn find(&mut self, key: SlotKey) -> Option<TimeSlot> {
        if let Some(slot) = self.by_key.get(&key) {
            return Some(slot.clone());
        }
        let found = self
            .slots
            .iter()
            .find(|s| s.weekday == key.weekday && s.index == key.index)
            .cloned()?;
        tracing::warn!("时间段 {} 不在缓存中，已从列表中找到 (id={})", key, found.id);
        self.by_key.insert(key, found.clone());
        self.by_id.insert(found.id, found.clone());
        Some(found)
    }

    /// 把排课记录中的时间段引用解析为完整时间段，必要时回填缓存
    pub fn resolve_ref(&mut self, slot_ref: &TimeslotRef) -> Option<TimeSlot> {
        match slot_ref {
            TimeslotRef::Embedded(embedded) => {
                let key = SlotKey::of(embedded)?;
                if let Some(slot) = self.by_id.get(&embedded.id) {
                    return Some(slot.clone());
                }
                if let Some(slot) = self.by_key.get(&key).cloned() {
                    if embedded.id != 0 {
                        self.by_id.insert(embedded.id, slot.clone());
                    }
                    return Some(slot);
                }
                // 缓存里没有：用嵌套对象临时补上
                self.insert(embedded.clone());
                Some(embedded.clone())
            }
            TimeslotRef::Id(id) => {
                if let Some(slot) = self.by_id.get(id) {
                    return Some(slot.clone());
                }
                let found = self.slots.iter().find(|s| s.id == *id).cloned()?;
                self.insert(found.clone());
                Some(found)
            }
        }
    }

    pub fn completeness(&self) -> Completeness {
        let mut missing = Vec::new();
        let mut existing = 0;
        for weekday in 1..=DAYS_PER_WEEK {
            for index in 1..=DEFAULT_PERIODS {
                let key = SlotKey { weekday, index };
                if self.by_key.contains_key(&key) {
                    existing += 1;
                } else {
                    missing.push(key);
                }
            }
        }
        Completeness {
            expected: (DAYS_PER_WEEK as usize) * (DEFAULT_PERIODS as usize),
            existing,
            missing,
        }
    }
}

/// `HH:MM` 或 `HH:MM:SS` 取前五位；格式不对时当作没有
fn clock(raw: Option<&str>) -> Option<&str> {
    let raw = raw?.trim();
    if CLOCK_RE.is_match(raw) {
        raw.get(..5)
    } else {
        None
    }
}
