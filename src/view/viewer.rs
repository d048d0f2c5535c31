use crate::store::models::PdfInfo;

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 2.0;
pub const SCALE_STEP: f32 = 0.1;
pub const LOAD_ERROR: &str = "Failed to load PDF. Please try again.";
const UNTITLED: &str = "Document.pdf";

/// Page and zoom state for the PDF on screen. Rendering itself belongs to
/// whatever front-end draws the pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pdf: PdfInfo,
    num_pages: u32,
    page: u32,
    scale: f32,
    error: Option<String>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            pdf: PdfInfo::default(),
            num_pages: 0,
            page: 1,
            scale: 1.0,
            error: None,
        }
    }
}

impl ViewerState {
    pub fn open(pdf: PdfInfo) -> Self {
        Self {
            pdf,
            ..Self::default()
        }
    }

    pub fn title(&self) -> &str {
        if self.pdf.file_name.is_empty() {
            UNTITLED
        } else {
            &self.pdf.file_name
        }
    }

    pub fn file_url(&self) -> &str {
        &self.pdf.file_url
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn on_document_loaded(&mut self, num_pages: u32) {
        self.num_pages = num_pages;
        self.page = self.page.clamp(1, num_pages.max(1));
        self.error = None;
    }

    pub fn on_document_error(&mut self) {
        self.error = Some(LOAD_ERROR.to_string());
    }

    pub fn change_page(&mut self, offset: i64) {
        let last = i64::from(self.num_pages.max(1));
        let target = (i64::from(self.page) + offset).clamp(1, last);
        // target is within 1..=u32::MAX by the clamp
        self.page = u32::try_from(target).unwrap_or(1);
    }

    pub fn change_scale(&mut self, delta: f32) {
        let scaled = (self.scale + delta).clamp(MIN_SCALE, MAX_SCALE);
        // keep the value on the 0.1 grid so repeated steps compare exactly
        self.scale = (scaled * 10.0).round() / 10.0;
    }

    pub fn zoom_in(&mut self) {
        self.change_scale(SCALE_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.change_scale(-SCALE_STEP);
    }

    pub fn can_zoom_in(&self) -> bool {
        self.scale < MAX_SCALE
    }

    pub fn can_zoom_out(&self) -> bool {
        self.scale > MIN_SCALE
    }

    pub fn can_go_back(&self) -> bool {
        self.page > 1
    }

    pub fn can_go_forward(&self) -> bool {
        self.page < self.num_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamping() {
        let mut viewer = ViewerState::default();
        viewer.on_document_loaded(3);
        viewer.change_page(-1);
        assert_eq!(viewer.page(), 1);
        viewer.change_page(5);
        assert_eq!(viewer.page(), 3);
        assert!(!viewer.can_go_forward());
        assert!(viewer.can_go_back());
    }

    #[test]
    fn test_scale_clamping() {
        let mut viewer = ViewerState::default();
        for _ in 0..20 {
            viewer.zoom_in();
        }
        assert_eq!(viewer.scale(), MAX_SCALE);
        assert!(!viewer.can_zoom_in());
        for _ in 0..20 {
            viewer.zoom_out();
        }
        assert_eq!(viewer.scale(), MIN_SCALE);
        assert!(!viewer.can_zoom_out());
    }

    #[test]
    fn test_title_and_errors() {
        let mut viewer = ViewerState::default();
        assert_eq!(viewer.title(), "Document.pdf");
        viewer.on_document_error();
        assert_eq!(viewer.error(), Some(LOAD_ERROR));
        viewer.on_document_loaded(2);
        assert!(viewer.error().is_none());

        let viewer = ViewerState::open(PdfInfo {
            file_name: "paper.pdf".into(),
            file_url: "/files/paper.pdf".into(),
        });
        assert_eq!(viewer.title(), "paper.pdf");
        assert_eq!(viewer.page(), 1);
    }
}
