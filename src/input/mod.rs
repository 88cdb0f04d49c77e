pub mod injector;

pub use injector::{typing_steps, FocusedInput, InjectError, TextInjector, TypingStep};
