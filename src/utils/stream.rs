//! 最新结果快照
//!
//! 单写者、单读者的快照通道。写者每次整体替换内容，读者拿到的总是一组完整的数据，
//! 不会看到写了一半的结果。

use std::sync::Arc;
use tokio::sync::watch;

/// 创建一对快照写端和读端，初始内容为空
pub fn latest<T: Send + Sync + 'static>() -> (StreamWriter<T>, StreamReader<T>) {
    let (tx, rx) = watch::channel::<Arc<[T]>>(Arc::from(Vec::new()));
    (StreamWriter { tx }, StreamReader { rx })
}

/// 快照写端，不可克隆
#[derive(Debug)]
pub struct StreamWriter<T> {
    tx: watch::Sender<Arc<[T]>>,
}

impl<T> StreamWriter<T> {
    /// 用新的一组数据替换当前快照
    pub fn publish(&self, items: impl Into<Arc<[T]>>) {
        self.tx.send_replace(items.into());
    }
}

/// 快照读端
#[derive(Debug, Clone)]
pub struct StreamReader<T> {
    rx: watch::Receiver<Arc<[T]>>,
}

impl<T> StreamReader<T> {
    /// 读取当前快照
    pub fn latest(&self) -> Arc<[T]> {
        Arc::clone(&self.rx.borrow())
    }
}
