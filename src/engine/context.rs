/// Whether layers run their training or inference path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Training,
    Inference,
}

/// Per-loop state handed to every forward call. Layers only read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingContext {
    mode: Mode,
}

impl TrainingContext {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn training() -> Self {
        Self::new(Mode::Training)
    }

    pub fn inference() -> Self {
        Self::new(Mode::Inference)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Training
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
}
