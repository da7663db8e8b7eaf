use anyhow::Result;
use async_trait::async_trait;

use super::{Screen, ScreenContext, UserInput};

mod presence;
mod qr;
mod rating;
mod thank_you;

pub use presence::PresenceScreen;
pub use qr::QrScreen;
pub use rating::RatingScreen;
pub use thank_you::ThankYouScreen;

/// One mounted screen.
///
/// `unmount` must leave nothing running and nothing held, whatever state
/// `mount` reached.
#[async_trait]
pub trait ScreenController: Send {
    async fn mount(&mut self) -> Result<()>;

    async fn handle_input(&mut self, _input: UserInput) {}

    async fn unmount(&mut self);
}

pub fn build_screen(screen: &Screen, context: ScreenContext) -> Box<dyn ScreenController> {
    match screen {
        Screen::Idle => Box::new(PresenceScreen::new(context)),
        Screen::QrScan => Box::new(QrScreen::new(context)),
        Screen::Rating { station } => Box::new(RatingScreen::new(context, station.clone())),
        Screen::ThankYou => Box::new(ThankYouScreen::new(context)),
    }
}
