//! TFLite推論バックエンド（tract-tflite）

use super::model::{label_scores, load_labels, Model, ModelLoader};
use crate::error::{AppError, Result};
use crate::normalizer::{NormalizedImage, CHANNELS};
use asclepius_common::Category;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_tflite::prelude::*;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

pub struct TfliteLoader {
    labels: Option<PathBuf>,
    input_size: u32,
}

impl TfliteLoader {
    pub fn new(labels: Option<PathBuf>, input_size: u32) -> Self {
        Self { labels, input_size }
    }
}

impl ModelLoader for TfliteLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Model>> {
        let labels = match &self.labels {
            Some(p) => load_labels(p)?,
            None => Vec::new(),
        };

        let side = self.input_size as usize;
        let model = tract_tflite::tflite()
            .model_for_path(path)
            .map_err(|e| load_error(path, e))?;

        // 入力はNHWC固定
        let inlet = model.input_outlets().map_err(|e| load_error(path, e))?[0];
        let input_dt = model
            .outlet_fact(inlet)
            .map_err(|e| load_error(path, e))?
            .datum_type;
        let fact = TypedFact::dt_shape(input_dt, tvec!(1, side, side, CHANNELS));

        let plan = model
            .with_input_fact(0, fact)
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| load_error(path, e))?;

        Ok(Arc::new(TfliteModel {
            plan,
            labels,
            input_dt,
        }))
    }
}

struct TfliteModel {
    plan: Plan,
    labels: Vec<String>,
    input_dt: DatumType,
}

impl TfliteModel {
    fn input_tensor(&self, image: &NormalizedImage) -> TractResult<Tensor> {
        let (h, w) = (image.height() as usize, image.width() as usize);
        let data = image.data();

        if self.input_dt.is_float() {
            let tensor = tract_ndarray::Array4::from_shape_fn((1, h, w, CHANNELS), |(_, y, x, c)| {
                data[(y * w + x) * CHANNELS + c] as f32 / 255.0
            })
            .into_tensor();
            return Ok(tensor.cast_to_dt(self.input_dt)?.into_owned());
        }

        let tensor =
            tract_ndarray::Array4::from_shape_vec((1, h, w, CHANNELS), data.to_vec())?.into_tensor();
        Ok(tensor.cast_to_dt(self.input_dt)?.into_owned())
    }
}

impl Model for TfliteModel {
    fn infer(&self, image: &NormalizedImage) -> Result<Vec<Category>> {
        let input = self
            .input_tensor(image)
            .map_err(|e| AppError::Inference(format!("input tensor: {}", e)))?;

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| AppError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| AppError::Inference("model produced no outputs".into()))?;

        let output_dt = output.datum_type();
        let as_f32 = output
            .cast_to::<f32>()
            .map_err(|e| AppError::Inference(format!("output is not numeric: {}", e)))?;
        let mut scores = as_f32
            .as_slice::<f32>()
            .map_err(|e| AppError::Inference(e.to_string()))?
            .to_vec();

        // 非量子化のu8出力は0-255
        if output_dt == DatumType::U8 {
            scores.iter_mut().for_each(|s| *s /= 255.0);
        }

        Ok(label_scores(&scores, &self.labels))
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::ModelLoad(format!("{}: {}", path.display(), e))
}
