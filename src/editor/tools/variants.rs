use super::VariantDirection;
use crate::remote::{GenerationMessage, RankedVariant, RemoteError, RemoteResult};
use crate::worker::{JobHandle, JobPoll};

/// Ranked generation results and the one currently shown. Index -1 shows none of them,
/// leaving the original visible.
#[derive(Debug, Default)]
pub(crate) struct VariantSet {
    variants: Vec<RankedVariant>,
    selected: isize,
}

impl VariantSet {
    pub fn new(variants: Vec<RankedVariant>) -> Self {
        let selected = if variants.is_empty() { -1 } else { 0 };
        Self { variants, selected }
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub const fn selected_index(&self) -> isize {
        self.selected
    }

    pub fn selected(&self) -> Option<&RankedVariant> {
        usize::try_from(self.selected)
            .ok()
            .and_then(|index| self.variants.get(index))
    }

    /// Moves the selection one step, wrapping through "none".
    pub fn step(&mut self, direction: VariantDirection) -> Option<&RankedVariant> {
        if self.variants.is_empty() {
            return None;
        }
        let last = self.variants.len() as isize - 1;
        self.selected = match direction {
            VariantDirection::Left if self.selected - 1 < -1 => last,
            VariantDirection::Left => self.selected - 1,
            VariantDirection::Right if self.selected + 1 > last => -1,
            VariantDirection::Right => self.selected + 1,
        };
        tracing::debug!(selected = self.selected, count = self.variants.len(), "variant selected");
        self.selected()
    }

    pub fn clear(&mut self) {
        self.variants.clear();
        self.selected = -1;
    }
}

#[derive(Debug)]
pub(crate) enum GenerationUpdate<T> {
    UploadProgress(f32),
    /// Uploads are done and the request was accepted.
    Submitted,
    Progress(f32),
    Finished(RemoteResult<T>),
}

/// A generation job owned by a tool. Dropping it stops listening.
#[derive(Debug)]
pub(crate) struct PendingGeneration<T> {
    job: JobHandle<RemoteResult<T>, GenerationMessage>,
}

impl<T> PendingGeneration<T> {
    pub const fn new(job: JobHandle<RemoteResult<T>, GenerationMessage>) -> Self {
        Self { job }
    }

    /// Everything that happened since the last poll, messages first.
    pub fn poll(&self) -> Vec<GenerationUpdate<T>> {
        let mut updates: Vec<_> = self
            .job
            .drain_messages()
            .into_iter()
            .map(|message| match message {
                GenerationMessage::UploadProgress(fraction) => GenerationUpdate::UploadProgress(fraction),
                GenerationMessage::Submitted { .. } => GenerationUpdate::Submitted,
                GenerationMessage::Progress(fraction) => GenerationUpdate::Progress(fraction),
            })
            .collect();
        match self.job.try_result() {
            JobPoll::Pending => {}
            JobPoll::Finished(result) => updates.push(GenerationUpdate::Finished(result)),
            JobPoll::Lost => {
                tracing::warn!(job = self.job.name(), "generation worker stopped without a result");
                updates.push(GenerationUpdate::Finished(Err(RemoteError::GenerationFailed(
                    "generation worker stopped".to_string(),
                ))));
            }
        }
        updates
    }

    pub fn cancel(&self) {
        self.job.cancel();
    }
}
