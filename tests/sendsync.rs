use glcaps::context::NotCurrentContext;
use glcaps::display::Display;
use glcaps::error::Error;

trait FailToCompileIfNotSend
where
    Self: Send,
{
}

trait FailToCompileIfNotSendSync
where
    Self: Send + Sync,
{
}

impl FailToCompileIfNotSendSync for Display {}
impl FailToCompileIfNotSendSync for Error {}

// Contexts move between threads while not current, but are never shared.
impl FailToCompileIfNotSend for NotCurrentContext {}
