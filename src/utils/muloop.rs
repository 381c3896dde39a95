use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// 循环任务的停止信号
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待下一个周期
    ///
    /// 停止信号优先于时钟，已停止时返回 `false`，循环体应立即退出。
    pub async fn tick(&mut self, interval: &mut Interval) -> bool {
        if self.is_stopped() {
            return false;
        }
        let ticked = tokio::select! {
            biased;
            _ = self.rx.wait_for(|stopped| *stopped) => false,
            _ = interval.tick() => true,
        };
        ticked && !self.is_stopped()
    }
}

/// 固定周期的时钟，第一次触发在一个周期之后，错过的周期直接跳过
pub fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// 后台循环任务
///
/// `stop` 返回之后循环体不会再执行任何一次迭代。
#[derive(Debug)]
pub struct MultiLoop<T> {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> MultiLoop<T> {
    /// 启动循环
    ///
    /// # 参数
    /// * `body` - 接收停止信号并返回循环退出原因的异步函数
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (stop, rx) = watch::channel(false);
        let handle = tokio::spawn(body(StopSignal { rx }));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// 检查循环是否已自行结束
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// 停止循环并等待任务结束
    ///
    /// 循环已自行结束时返回其退出原因。
    pub async fn stop(mut self) -> Option<T> {
        let _ = self.stop.send(true);
        let handle = self.handle.take()?;
        if !handle.is_finished() {
            handle.abort();
        }
        handle.await.ok()
    }
}

impl<T> Drop for MultiLoop<T> {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn no_iteration_runs_after_stop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let looped = MultiLoop::spawn(move |mut stop| async move {
            let mut clock = ticker(Duration::from_millis(1));
            while stop.tick(&mut clock).await {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        looped.stop().await;
        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn finished_loop_reports_exit_value() {
        let looped = MultiLoop::spawn(|_stop| async { 7u8 });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(looped.is_finished());
        assert_eq!(looped.stop().await, Some(7));
    }
}
