//! Alert repository port trait.

use crate::domain::alert::Alert;
use crate::domain::error::AlertEngineError;

pub trait AlertRepository {
    fn load_alerts(&self) -> Result<Vec<Alert>, AlertEngineError>;
}
