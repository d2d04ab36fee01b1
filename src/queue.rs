//! Depth-ordered render command queues
//!
//! The renderer keeps two of these: an init queue run once before the main
//! loop and a render queue run every frame. Commands carry a name for
//! removal, a depth for ordering, the shader they drive, and a callback.
//!
//! Ordering is explicit: `sort` reorders the storage, `execute` runs it as
//! stored. Commands added after a sort run in insertion order until the
//! next sort.

use std::rc::Rc;

use crate::shader::ShaderProgram;

/// Callback invoked when the command executes
pub type RenderFunc<Ctx> = Box<dyn FnMut(&ShaderProgram, &mut Ctx)>;

/// A named render callback at a queue depth
pub struct RenderCommand<Ctx> {
    name: String,
    depth: i32,
    shader: Rc<ShaderProgram>,
    func: RenderFunc<Ctx>,
}

impl<Ctx> RenderCommand<Ctx> {
    pub fn new(
        name: &str,
        depth: i32,
        shader: Rc<ShaderProgram>,
        func: impl FnMut(&ShaderProgram, &mut Ctx) + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            depth,
            shader,
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn shader(&self) -> &Rc<ShaderProgram> {
        &self.shader
    }
}

/// Ordered collection of render commands, generic over the context the
/// callbacks receive.
pub struct RenderQueue<Ctx> {
    commands: Vec<RenderCommand<Ctx>>,
}

impl<Ctx> Default for RenderQueue<Ctx> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<Ctx> RenderQueue<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Names are not required to be unique.
    pub fn add(&mut self, command: RenderCommand<Ctx>) {
        self.commands.push(command);
    }

    /// Remove the first command with this name; a miss is a no-op.
    pub fn remove(&mut self, name: &str) {
        if let Some(index) = self.commands.iter().position(|c| c.name == name) {
            self.commands.remove(index);
        }
    }

    /// Order commands by ascending depth. Commands at equal depth keep
    /// their insertion order.
    pub fn sort(&mut self) {
        self.commands.sort_by_key(|c| c.depth);
    }

    /// Run every command in storage order.
    pub fn execute(&mut self, ctx: &mut Ctx) {
        for command in &mut self.commands {
            (command.func)(&command.shader, ctx);
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderCommand<Ctx>> {
        self.commands.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{ShaderProgram, UniformLayout};

    fn shader(name: &str) -> Rc<ShaderProgram> {
        Rc::new(ShaderProgram::degraded(
            name,
            UniformLayout::default(),
            vec![],
        ))
    }

    fn recording(name: &'static str) -> RenderFunc<Vec<String>> {
        Box::new(move |_, log: &mut Vec<String>| log.push(name.to_string()))
    }

    fn command(name: &'static str, depth: i32) -> RenderCommand<Vec<String>> {
        RenderCommand {
            name: name.to_string(),
            depth,
            shader: shader(name),
            func: recording(name),
        }
    }

    #[test]
    fn sort_orders_by_ascending_depth() {
        let mut queue = RenderQueue::new();
        queue.add(command("light_box", 3000));
        queue.add(command("geometry", 1000));
        queue.add(command("lighting", 2000));
        queue.sort();

        let mut log = Vec::new();
        queue.execute(&mut log);
        assert_eq!(log, ["geometry", "lighting", "light_box"]);
    }

    #[test]
    fn equal_depths_keep_insertion_order() {
        let mut queue = RenderQueue::new();
        queue.add(command("first", 500));
        queue.add(command("second", 500));
        queue.add(command("third", 500));
        queue.sort();

        let mut log = Vec::new();
        queue.execute(&mut log);
        assert_eq!(log, ["first", "second", "third"]);
    }

    #[test]
    fn execute_without_sort_runs_insertion_order() {
        let mut queue = RenderQueue::new();
        queue.add(command("b", 2000));
        queue.add(command("a", 1000));

        let mut log = Vec::new();
        queue.execute(&mut log);
        assert_eq!(log, ["b", "a"]);
    }

    #[test]
    fn remove_takes_first_match_only() {
        let mut queue = RenderQueue::new();
        queue.add(command("dup", 1));
        queue.add(command("keep", 2));
        queue.add(command("dup", 3));

        queue.remove("dup");
        assert_eq!(queue.len(), 2);

        let mut log = Vec::new();
        queue.execute(&mut log);
        assert_eq!(log, ["keep", "dup"]);
    }

    #[test]
    fn remove_missing_name_is_noop() {
        let mut queue = RenderQueue::new();
        queue.add(command("only", 1));
        queue.remove("absent");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn geometry_runs_before_lighting_regardless_of_add_order() {
        // lighting registered first, geometry second; depths still win
        let mut queue = RenderQueue::new();
        queue.add(command("lighting", 2000));
        queue.add(command("geometry", 1000));
        queue.sort();

        let mut log = Vec::new();
        queue.execute(&mut log);
        assert_eq!(log, ["geometry", "lighting"]);
    }

    #[test]
    fn removed_pass_no_longer_fires() {
        let mut queue = RenderQueue::new();
        queue.add(command("geometry", 1000));
        queue.add(command("lighting", 2000));
        queue.sort();
        queue.remove("lighting");

        let mut log = Vec::new();
        queue.execute(&mut log);
        assert_eq!(log, ["geometry"]);
    }
}
