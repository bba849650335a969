//! Strategy layer: the base template, signals, and target-position trading.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::StrategyConfig;
use crate::engine::CtaEngine;

mod multi_signal;
mod settings;
mod signal;
mod target_pos;
mod template;

pub use multi_signal::{MultiSignalParams, MultiSignalStrategy};
pub use settings::{class_parameters, merge_setting, to_setting, Setting};
pub use signal::{CtaSignal, MaCrossSignal, SignalPosition};
pub use target_pos::{
    plan_backtesting, plan_live, reference_price, OrderPlan, TargetPosParams, TargetPosTemplate,
};
pub use template::{CtaTemplate, StrategyContext, StrategyData, BASE_VARIABLES};

/// Strategy classes that can be built by name.
pub const STRATEGY_CLASSES: [&str; 2] = [
    TargetPosTemplate::CLASS_NAME,
    MultiSignalStrategy::CLASS_NAME,
];

/// Default parameters of a built-in strategy class.
pub fn class_defaults(class_name: &str) -> Option<Setting> {
    match class_name {
        TargetPosTemplate::CLASS_NAME => Some(class_parameters::<TargetPosParams>()),
        MultiSignalStrategy::CLASS_NAME => Some(class_parameters::<MultiSignalParams>()),
        _ => None,
    }
}

/// Build a strategy instance from its config.
pub fn create_strategy(
    engine: Arc<dyn CtaEngine>,
    config: &StrategyConfig,
) -> Result<Box<dyn CtaTemplate>> {
    let strategy: Box<dyn CtaTemplate> = match config.class_name.as_str() {
        TargetPosTemplate::CLASS_NAME => Box::new(TargetPosTemplate::new(
            engine,
            &config.strategy_name,
            &config.vt_symbol,
            &config.setting,
        )?),
        MultiSignalStrategy::CLASS_NAME => Box::new(MultiSignalStrategy::new(
            engine,
            &config.strategy_name,
            &config.vt_symbol,
            &config.setting,
        )?),
        other => bail!("Unknown strategy class: {}", other),
    };
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineType, RecordingEngine};
    use serde_json::json;

    #[test]
    fn test_class_defaults() {
        let defaults = class_defaults("TargetPosTemplate").unwrap();
        let tick_add: rust_decimal::Decimal =
            serde_json::from_value(defaults["tick_add"].clone()).unwrap();
        assert_eq!(tick_add, rust_decimal_macros::dec!(1));

        assert!(class_defaults("MultiSignalStrategy").unwrap().contains_key("fast_window"));
        assert!(class_defaults("Unknown").is_none());
    }

    #[test]
    fn test_create_strategy_by_class_name() {
        let engine: Arc<dyn CtaEngine> = Arc::new(RecordingEngine::new(EngineType::Live));
        let config = StrategyConfig {
            strategy_name: "ma".to_string(),
            class_name: "MultiSignalStrategy".to_string(),
            vt_symbol: "rb2405.SHFE".to_string(),
            setting: json!({"fast_window": 3}).as_object().cloned().unwrap(),
        };

        let strategy = create_strategy(engine.clone(), &config).unwrap();
        assert_eq!(strategy.class_name(), "MultiSignalStrategy");
        assert_eq!(strategy.get_parameters()["fast_window"], json!(3));

        let unknown = StrategyConfig {
            class_name: "Nope".to_string(),
            ..config
        };
        assert!(create_strategy(engine, &unknown).is_err());
    }
}
