use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::id::{BrowserContextId, FrameTreeNodeId, PageId};

/// Page state: one frame tree, as shown in a tab or a popup window.
#[derive(Debug)]
pub struct Page {
    /// Page id
    id: PageId,
    /// Root frame of the page
    root: FrameTreeNodeId,
    /// Profile the page belongs to
    browser_context: BrowserContextId,
    /// Whether the page is hidden
    hidden: bool,
    /// Frame with focus inside the page
    focused_frame: Option<FrameTreeNodeId>,
    /// Whether the page is loading
    is_loading: bool,
    /// Last reported load progress
    load_progress: f64,
}

impl Page {
    /// Create a new page state.
    pub fn new(id: PageId, root: FrameTreeNodeId, browser_context: BrowserContextId) -> Self {
        Self {
            id,
            root,
            browser_context,
            hidden: false,
            focused_frame: None,
            is_loading: false,
            load_progress: 0.0,
        }
    }

    /// Get page id.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Get the root frame of the page.
    pub fn root(&self) -> FrameTreeNodeId {
        self.root
    }

    /// Get the page browser context.
    pub fn browser_context(&self) -> BrowserContextId {
        self.browser_context
    }

    /// Check if the page is hidden.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Get the focused frame of the page.
    pub fn focused_frame(&self) -> Option<FrameTreeNodeId> {
        self.focused_frame
    }

    pub(crate) fn set_focused_frame(&mut self, frame: Option<FrameTreeNodeId>) {
        self.focused_frame = frame;
    }

    /// Check if the page is loading.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub(crate) fn set_loading(&mut self, is_loading: bool) {
        self.is_loading = is_loading;
    }

    /// Get the last reported load progress.
    pub fn load_progress(&self) -> f64 {
        self.load_progress
    }

    pub(crate) fn set_load_progress(&mut self, progress: f64) {
        self.load_progress = progress;
    }
}

/// Page manager to handle multiple pages.
#[derive(Debug, Default)]
pub struct PageManager {
    /// Current focused page id
    focused_page_id: Option<PageId>,
    /// Page id -> Page
    page_map: HashMap<PageId, Page>,
}

impl PageManager {
    /// Create a new page manager.
    pub fn new() -> Self {
        Self::default()
    }
    /// Get page count.
    pub fn count(&self) -> usize {
        self.page_map.len()
    }
    /// Get current focused page id.
    pub fn focused_page_id(&self) -> Option<PageId> {
        self.focused_page_id
    }
    /// Get current focused page.
    pub fn focused_page(&self) -> Option<&Page> {
        self.focused_page_id.and_then(|id| self.page_map.get(&id))
    }
    /// Get all page ids.
    pub fn page_ids(&self) -> Vec<PageId> {
        self.page_map.keys().cloned().collect()
    }
    /// Focus the page by page id.
    pub fn focus_page(&mut self, page_id: PageId) -> Option<&Page> {
        if let Some(page) = self.page_map.get(&page_id) {
            self.focused_page_id = Some(page_id);
            Some(page)
        } else {
            self.focused_page_id = None;
            None
        }
    }
    /// Get page by page id.
    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.page_map.get(&id)
    }
    /// Get page by page id as mutable.
    pub fn page_mut(&mut self, id: PageId) -> Option<&mut Page> {
        self.page_map.get_mut(&id)
    }
    /// Append a page.
    pub fn append_page(&mut self, page: Page, focused: bool) {
        let id = page.id();
        self.page_map.insert(id, page);
        if focused {
            self.focused_page_id = Some(id);
        }
    }
    /// Close a page.
    pub fn close_page(&mut self, id: PageId) -> Result<Page> {
        match self.page_map.remove(&id) {
            Some(page) => {
                if self.focused_page_id == Some(id) {
                    self.focused_page_id = None;
                }
                Ok(page)
            }
            None => Err(Error::PageNotFound(id)),
        }
    }
}
