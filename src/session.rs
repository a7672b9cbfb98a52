//! Session-scoped ownership of the single live carousel.
//!
//! There is at most one [`CarouselData`] per session. Loading a new one
//! replaces the old; [`CarouselSession::reset`] drops it together with every
//! slide.

use crate::types::{CarouselData, SessionError, Slide};

#[derive(Debug, Default)]
pub struct CarouselSession {
    data: Option<CarouselData>,
}

impl CarouselSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a carousel after checking its invariants.
    pub fn load(&mut self, data: CarouselData) -> Result<(), SessionError> {
        data.validate()?;
        self.data = Some(data);
        Ok(())
    }

    pub fn current(&self) -> Result<&CarouselData, SessionError> {
        self.data.as_ref().ok_or(SessionError::NoCarousel)
    }

    pub fn current_mut(&mut self) -> Result<&mut CarouselData, SessionError> {
        self.data.as_mut().ok_or(SessionError::NoCarousel)
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn edit_slide_text(&mut self, id: u32, text: &str) -> Result<&Slide, SessionError> {
        let slide = self.current_mut()?.slide_mut(id)?;
        slide.edit_text(text);
        Ok(slide)
    }

    pub fn revert_slide_text(&mut self, id: u32) -> Result<(), SessionError> {
        self.current_mut()?.slide_mut(id)?.revert_text();
        Ok(())
    }

    /// Attach a user-supplied image that overrides the generated one.
    pub fn set_custom_image(&mut self, id: u32, url: Option<String>) -> Result<(), SessionError> {
        self.current_mut()?.slide_mut(id)?.custom_image_url = url;
        Ok(())
    }

    /// Drop the carousel and all of its slides.
    pub fn reset(&mut self) -> Option<CarouselData> {
        self.data.take()
    }
}
