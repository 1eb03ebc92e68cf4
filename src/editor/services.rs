use std::fmt;
use std::sync::Arc;

use crate::config::{EditorConfig, PollingConfig};
use crate::remote::{
    run_augmentation, run_generation, AugmentOutcome, AugmentPlan, Clock, GenerationMessage,
    GenerationOutcome, GenerationPlan, ImageId, NotificationHub, PixelSource, RemoteGenerator,
    RemoteResult, Services, SystemClock,
};
use crate::storage::{MemoryArgsStore, ToolArgsStore};
use crate::worker::{JobExecutor, JobHandle};

pub type GenerationJob = JobHandle<RemoteResult<GenerationOutcome>, GenerationMessage>;
pub type AugmentJob = JobHandle<RemoteResult<AugmentOutcome>, GenerationMessage>;

/// Remote collaborators shared by the generation-backed tools.
#[derive(Clone)]
pub struct RemoteServices {
    pub generator: Arc<dyn RemoteGenerator>,
    pub pixels: Arc<dyn PixelSource>,
    pub notifications: Option<NotificationHub>,
    pub clock: Arc<dyn Clock>,
    pub executor: JobExecutor,
}

impl fmt::Debug for RemoteServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteServices")
            .field("notifications", &self.notifications.is_some())
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl RemoteServices {
    pub fn new(generator: Arc<dyn RemoteGenerator>, pixels: Arc<dyn PixelSource>) -> Self {
        Self {
            generator,
            pixels,
            notifications: None,
            clock: Arc::new(SystemClock),
            executor: JobExecutor::default(),
        }
    }

    pub fn with_notifications(mut self, hub: NotificationHub) -> Self {
        self.notifications = Some(hub);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_executor(mut self, executor: JobExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub(crate) fn spawn_generation(&self, plan: GenerationPlan, polling: PollingConfig) -> GenerationJob {
        let Self {
            generator,
            pixels,
            notifications,
            clock,
            executor,
        } = self.clone();
        executor.spawn("generation", move |context| {
            let services = Services {
                generator: &*generator,
                pixels: &*pixels,
                notifications: notifications.as_ref(),
                clock: &*clock,
                polling: &polling,
            };
            run_generation(&services, plan, context)
        })
    }

    pub(crate) fn spawn_augmentation(&self, plan: AugmentPlan, polling: PollingConfig) -> AugmentJob {
        let Self {
            generator,
            pixels,
            notifications,
            clock,
            executor,
        } = self.clone();
        executor.spawn("augmentation", move |context| {
            let services = Services {
                generator: &*generator,
                pixels: &*pixels,
                notifications: notifications.as_ref(),
                clock: &*clock,
                polling: &polling,
            };
            run_augmentation(&services, plan, context)
        })
    }
}

/// The image being edited, as known to the generation service. Its prompts are the
/// fallback when a tool's own prompt is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageContext {
    pub id: Option<ImageId>,
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
}

/// Everything a tool is built from besides the renderer.
#[derive(Clone)]
pub struct ToolEnvironment {
    pub config: Arc<EditorConfig>,
    pub args: Arc<dyn ToolArgsStore>,
    pub remote: Option<RemoteServices>,
    pub image: ImageContext,
}

impl fmt::Debug for ToolEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolEnvironment")
            .field("config", &self.config)
            .field("remote", &self.remote)
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

impl ToolEnvironment {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config: Arc::new(config),
            args: Arc::new(MemoryArgsStore::new()),
            remote: None,
            image: ImageContext::default(),
        }
    }

    pub fn with_args_store(mut self, args: Arc<dyn ToolArgsStore>) -> Self {
        self.args = args;
        self
    }

    pub fn with_remote(mut self, remote: RemoteServices) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_image(mut self, image: ImageContext) -> Self {
        self.image = image;
        self
    }
}
