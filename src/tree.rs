//! Window tree
//!
//! The drawable hierarchy that property notifications are fanned out over,
//! together with the per-window event selections clients have made.

use std::collections::HashMap;

use x11rb::protocol::xproto::Window;

use crate::client::ClientId;
use crate::error::{Result, RrError};

/// One client's interest in RandR events on one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSelection {
    pub client: ClientId,
    pub mask: u16,
}

#[derive(Debug, Default)]
struct WindowNode {
    children: Vec<Window>,
    /// Registration order
    selections: Vec<EventSelection>,
}

#[derive(Debug, Default)]
pub struct WindowTree {
    nodes: HashMap<Window, WindowNode>,
}

impl WindowTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a screen root window
    pub fn add_root(&mut self, window: Window) {
        self.nodes.entry(window).or_default();
    }

    pub fn add_child(&mut self, parent: Window, window: Window) -> Result<()> {
        let node = self.nodes.get_mut(&parent).ok_or(RrError::Window(parent))?;
        node.children.push(window);
        self.nodes.insert(window, WindowNode::default());
        Ok(())
    }

    /// Set `client`'s mask on `window`. A zero mask removes the selection;
    /// a changed mask keeps the original registration position.
    pub fn select_input(&mut self, window: Window, client: ClientId, mask: u16) -> Result<()> {
        let node = self.nodes.get_mut(&window).ok_or(RrError::Window(window))?;
        match node.selections.iter().position(|s| s.client == client) {
            Some(index) if mask != 0 => node.selections[index].mask = mask,
            Some(index) => {
                node.selections.remove(index);
            }
            None if mask != 0 => node.selections.push(EventSelection { client, mask }),
            None => {}
        }
        Ok(())
    }

    /// Drop every selection a disconnecting client made
    pub fn remove_client(&mut self, client: ClientId) {
        for node in self.nodes.values_mut() {
            node.selections.retain(|s| s.client != client);
        }
    }

    pub fn selections(&self, window: Window) -> &[EventSelection] {
        self.nodes
            .get(&window)
            .map_or(&[], |node| node.selections.as_slice())
    }

    /// Pre-order walk from `root`, visiting every descendant
    pub fn walk(&self, root: Window, mut visit: impl FnMut(Window, &[EventSelection])) {
        let mut stack = vec![root];
        while let Some(window) = stack.pop() {
            let Some(node) = self.nodes.get(&window) else {
                continue;
            };
            visit(window, &node.selections);
            stack.extend(node.children.iter().rev());
        }
    }
}
