use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::flow::{Screen, ScreenContext};
use crate::gate::TransitionGate;

use super::ScreenController;

pub struct ThankYouScreen {
    context: ScreenContext,
    gate: TransitionGate,
}

impl ThankYouScreen {
    pub fn new(context: ScreenContext) -> Self {
        Self {
            context,
            gate: TransitionGate::new(),
        }
    }
}

#[async_trait]
impl ScreenController for ThankYouScreen {
    async fn mount(&mut self) -> Result<()> {
        let navigator = self.context.navigator.clone();
        let delay = Duration::from_millis(self.context.config.flow.thank_you_ms);
        self.gate.fire_after(true, &self.context.scope, delay, async move {
            navigator.go(Screen::Idle);
        });
        Ok(())
    }

    async fn unmount(&mut self) {
        self.context.scope.mark_unmounted();
        self.context.scope.close();
    }
}
