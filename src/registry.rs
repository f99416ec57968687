//! Process-wide model handles, loaded once during bootstrap.

use anyhow::{Context, Result};
use std::{path::Path, sync::Arc};

use crate::config::Config;
use crate::model::{load_decoder, Classifier, LabelDecoder, TorchClassifier};
use crate::schema::DefaultTable;

/// One prediction target: its classifier and, if one was shipped, the decoder
/// for its class indices.
#[derive(Clone)]
pub struct Target {
    pub classifier: Arc<dyn Classifier>,
    pub decoder: Option<Arc<LabelDecoder>>,
}

impl Target {
    pub fn new(classifier: Arc<dyn Classifier>, decoder: Option<LabelDecoder>) -> Self {
        Self {
            classifier,
            decoder: decoder.map(Arc::new),
        }
    }
}

#[derive(Clone)]
pub struct ModelRegistry {
    pub sleep: Target,
    pub stress: Target,
    pub defaults: Arc<DefaultTable>,
}

impl ModelRegistry {
    /// Assembles a registry from already-built targets, checking that the
    /// default table can fill every field of both schemas.
    pub fn new(sleep: Target, stress: Target, defaults: DefaultTable) -> Result<Self> {
        sleep
            .classifier
            .schema()
            .check_defaults(&defaults)
            .context("sleep disorder schema rejects the default table")?;
        stress
            .classifier
            .schema()
            .check_defaults(&defaults)
            .context("stress level schema rejects the default table")?;
        Ok(Self {
            sleep,
            stress,
            defaults: Arc::new(defaults),
        })
    }

    /// Loads both classifiers (fatal on failure) and their decoders
    /// (absent on failure).
    pub fn load(cfg: &Config) -> Result<Self> {
        let sleep_clf = TorchClassifier::load(&cfg.sleep_model_path, &cfg.sleep_meta_path)
            .context("loading sleep disorder classifier")?;
        tracing::info!(
            "loaded sleep disorder model {}; feat_list[{}]: {:?}",
            cfg.sleep_model_path.display(),
            sleep_clf.schema().len(),
            sleep_clf.schema().names().collect::<Vec<_>>()
        );

        let stress_clf = TorchClassifier::load(&cfg.stress_model_path, &cfg.stress_meta_path)
            .context("loading stress level classifier")?;
        tracing::info!(
            "loaded stress level model {}; feat_list[{}]: {:?}",
            cfg.stress_model_path.display(),
            stress_clf.schema().len(),
            stress_clf.schema().names().collect::<Vec<_>>()
        );

        let sleep = Target::new(
            Arc::new(sleep_clf),
            optional_decoder("sleep disorder", &cfg.sleep_decoder_path),
        );
        let stress = Target::new(
            Arc::new(stress_clf),
            optional_decoder("stress level", &cfg.stress_decoder_path),
        );

        Self::new(sleep, stress, DefaultTable::standard())
    }
}

fn optional_decoder(target: &str, path: &Path) -> Option<LabelDecoder> {
    match load_decoder(path) {
        Ok(Some(d)) => {
            tracing::info!(
                "{} label decoder loaded from {} ({} classes)",
                target,
                path.display(),
                d.classes().len()
            );
            Some(d)
        }
        Ok(None) => {
            tracing::info!(
                "no {} label decoder at {}; serving raw classes",
                target,
                path.display()
            );
            None
        }
        Err(e) => {
            tracing::warn!(
                "ignoring {} label decoder: {:#}; serving raw classes",
                target,
                e
            );
            None
        }
    }
}
