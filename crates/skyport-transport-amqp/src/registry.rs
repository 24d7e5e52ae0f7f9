//! # 设备注册表
//!
//! ## 核心意图（Why）
//! - 以设备标识为唯一键保存全部已注册设备，并为调用方提供稳定的 [`DeviceHandle`]：句柄在设备
//!   注销前始终有效，注销后不会被复用；
//! - Tick 需要稳定的遍历顺序，注册表按句柄（即注册先后）有序迭代。
//!
//! ## 行为契约（What）
//! - 标识唯一：插入同名条目会原样退回该条目，注册表保持不变；
//! - 移除先于释放：[`DeviceRegistry::remove`] 只负责摘除，资源释放由调用方在摘除后进行。

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::device::DeviceEntry;

/// 已注册设备的稳定句柄。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    /// 句柄编号，仅用于日志与诊断。
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
pub(crate) struct DeviceRegistry {
    entries: BTreeMap<DeviceHandle, DeviceEntry>,
    by_id: HashMap<Arc<str>, DeviceHandle>,
    next: u64,
}

impl DeviceRegistry {
    pub(crate) fn contains(&self, device_id: &str) -> bool {
        self.by_id.contains_key(device_id)
    }

    pub(crate) fn handle_of(&self, device_id: &str) -> Option<DeviceHandle> {
        self.by_id.get(device_id).copied()
    }

    /// 插入新条目；标识已存在时退回条目。
    pub(crate) fn insert(&mut self, entry: DeviceEntry) -> Result<DeviceHandle, DeviceEntry> {
        match self.by_id.entry(entry.id_arc()) {
            Entry::Occupied(_) => Err(entry),
            Entry::Vacant(slot) => {
                self.next += 1;
                let handle = DeviceHandle(self.next);
                slot.insert(handle);
                self.entries.insert(handle, entry);
                Ok(handle)
            }
        }
    }

    pub(crate) fn remove(&mut self, handle: DeviceHandle) -> Option<DeviceEntry> {
        let entry = self.entries.remove(&handle)?;
        self.by_id.remove(entry.id());
        Some(entry)
    }

    pub(crate) fn get(&self, handle: DeviceHandle) -> Option<&DeviceEntry> {
        self.entries.get(&handle)
    }

    pub(crate) fn get_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceEntry> {
        self.entries.get_mut(&handle)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (DeviceHandle, &mut DeviceEntry)> {
        self.entries.iter_mut().map(|(handle, entry)| (*handle, entry))
    }

    /// 按注册顺序摘除全部条目。
    pub(crate) fn drain(&mut self) -> Vec<DeviceEntry> {
        self.by_id.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
