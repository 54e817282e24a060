//! Host-owned registry of subject pipelines

use crate::core::{Frame, Handedness};
use crate::pipeline::{SubjectPipeline, TickOutcome};
use crate::skeleton::sink::SkeletonSink;
use crate::validation::{PipelineError, PipelineResult};
use std::collections::HashMap;
use tracing::warn;

/// Subject pipelines by name, plus the active articulated hand for each
/// side so hand consumers can find it without a global.
#[derive(Debug, Default)]
pub struct SubjectRegistry {
    pipelines: HashMap<String, SubjectPipeline>,
    active_hands: HashMap<Handedness, String>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pipeline. A name already in use, or a hand whose side already
    /// has an active hand, is refused and the pipeline handed back.
    pub fn register(&mut self, pipeline: SubjectPipeline) -> Result<(), (PipelineError, SubjectPipeline)> {
        let name = pipeline.name().to_string();
        if self.pipelines.contains_key(&name) {
            let error = PipelineError::RegistryConflict {
                key: format!("subject '{}'", name),
                holder: name.clone(),
            };
            warn!(subject = %name, "{}", error);
            return Err((error, pipeline));
        }

        if let Some(handedness) = pipeline.handedness() {
            if let Some(holder) = self.active_hands.get(&handedness) {
                let error = PipelineError::RegistryConflict {
                    key: format!("{:?} hand", handedness),
                    holder: holder.clone(),
                };
                warn!(subject = %name, "{}", error);
                return Err((error, pipeline));
            }
            self.active_hands.insert(handedness, name.clone());
        }

        self.pipelines.insert(name, pipeline);
        Ok(())
    }

    /// Remove a pipeline, releasing its hand slot
    pub fn remove(&mut self, name: &str) -> Option<SubjectPipeline> {
        let pipeline = self.pipelines.remove(name)?;
        self.active_hands.retain(|_, holder| holder.as_str() != name);
        Some(pipeline)
    }

    pub fn get(&self, name: &str) -> Option<&SubjectPipeline> {
        self.pipelines.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SubjectPipeline> {
        self.pipelines.get_mut(name)
    }

    pub fn active_hand(&self, handedness: Handedness) -> Option<&SubjectPipeline> {
        self.active_hands
            .get(&handedness)
            .and_then(|name| self.pipelines.get(name))
    }

    pub fn active_hand_mut(&mut self, handedness: Handedness) -> Option<&mut SubjectPipeline> {
        let name = self.active_hands.get(&handedness)?;
        self.pipelines.get_mut(name)
    }

    /// Tick one subject; unknown names are an error, a missing frame is not
    pub fn tick(
        &mut self,
        name: &str,
        frame: Option<&Frame>,
        sink: &mut dyn SkeletonSink,
    ) -> PipelineResult<TickOutcome> {
        let pipeline = self
            .pipelines
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownSubject {
                subject: name.to_string(),
            })?;
        Ok(pipeline.tick(frame, sink))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MarkerSample, SegmentGroup};
    use crate::skeleton::sink::BoneTree;
    use crate::utils::config::PipelineConfig;

    fn hand(name: &str, handedness: Handedness) -> SubjectPipeline {
        SubjectPipeline::new(PipelineConfig::for_hand(name, handedness)).unwrap()
    }

    #[test]
    fn test_one_active_hand_per_side() {
        let mut registry = SubjectRegistry::new();
        registry.register(hand("right_a", Handedness::Right)).unwrap();
        registry.register(hand("left", Handedness::Left)).unwrap();

        let (error, refused) = registry.register(hand("right_b", Handedness::Right)).unwrap_err();
        assert!(!error.is_fatal());
        assert_eq!(
            error,
            PipelineError::RegistryConflict {
                key: "Right hand".to_string(),
                holder: "right_a".to_string(),
            }
        );
        assert_eq!(refused.name(), "right_b");

        assert_eq!(registry.active_hand(Handedness::Right).unwrap().name(), "right_a");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_releases_slot() {
        let mut registry = SubjectRegistry::new();
        registry.register(hand("right_a", Handedness::Right)).unwrap();
        assert!(registry.remove("right_a").is_some());
        assert!(registry.active_hand(Handedness::Right).is_none());

        registry.register(hand("right_b", Handedness::Right)).unwrap();
        assert_eq!(registry.active_hand_mut(Handedness::Right).unwrap().name(), "right_b");
    }

    #[test]
    fn test_duplicate_name_refused() {
        let mut registry = SubjectRegistry::new();
        registry.register(SubjectPipeline::new(PipelineConfig::for_headset("hmd")).unwrap()).unwrap();
        let result = registry.register(SubjectPipeline::new(PipelineConfig::for_headset("hmd")).unwrap());
        assert!(result.is_err());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["hmd"]);
    }

    #[test]
    fn test_tick_by_name() {
        let config = PipelineConfig {
            subject_name: "wand".to_string(),
            root_segment: "body".to_string(),
            segments: vec![SegmentGroup::new("body", ["m1"])],
            ..PipelineConfig::default()
        };
        let mut registry = SubjectRegistry::new();
        registry.register(SubjectPipeline::new(config).unwrap()).unwrap();
        let mut tree = BoneTree::from_edges([("body", None)]);

        let frame = Frame::new(0.0).with_marker("m1", MarkerSample::new(1.0, 2.0, 3.0));
        assert_eq!(registry.tick("wand", Some(&frame), &mut tree), Ok(TickOutcome::Processed));
        assert_eq!(registry.tick("wand", None, &mut tree), Ok(TickOutcome::Skipped));
        assert!(registry.tick("ghost", None, &mut tree).is_err());
        assert!(registry.get("wand").unwrap().last_output().is_some());
    }
}
