// Cancellation signal for the blocking wait of a command

use tokio::sync::watch;

/// Triggers every [`Interrupt`] created from the same pair
#[derive(Debug)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

/// Resolves once the matching [`InterruptHandle`] fires
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

pub fn pair() -> (InterruptHandle, Interrupt) {
    let (tx, rx) = watch::channel(false);
    (InterruptHandle { tx }, Interrupt { rx })
}

impl InterruptHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Interrupt {
        Interrupt {
            rx: self.tx.subscribe(),
        }
    }
}

impl Interrupt {
    /// An interrupt that never fires
    pub fn never() -> Self {
        let (_, interrupt) = pair();
        interrupt
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until triggered. Pends forever if the handle is gone.
    pub async fn triggered(&mut self) {
        let fired = self.rx.wait_for(|&fired| fired).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}
