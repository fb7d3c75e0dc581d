//! Timer stdlib functions

use std::time::Duration;

use super::arg;
use crate::executor::evaluator::Runtime;
use crate::executor::pending::PendingValue;
use crate::executor::types::{EvalResult, Value};

/// delay(ms, value) - pending value that settles to `value` after `ms`
///
/// The timer starts when something first waits on the value, i.e. when
/// evaluation touches it.
pub fn delay(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let ms = arg(args, 0).to_number();
    let ms = if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 };
    let value = arg(args, 1);
    Ok(Value::Pending(PendingValue::from_future(async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(value)
    })))
}
