//! Message type tree of a Protobuf schema file
//!
//! Every message, nested ones included, is reachable both by its dotted name and
//! by its index path: the position of each enclosing message among its siblings,
//! from the file root down.

use prost_reflect::{FileDescriptor, MessageDescriptor};

#[derive(Debug, Clone)]
pub struct DescriptorNode {
    descriptor: MessageDescriptor,
    indexes: Vec<i32>,
    children: Vec<DescriptorNode>,
}

impl DescriptorNode {
    fn build(descriptor: MessageDescriptor, indexes: Vec<i32>) -> Self {
        let children = descriptor
            .child_messages()
            .enumerate()
            .map(|(i, child)| {
                let mut path = indexes.clone();
                path.push(i as i32);
                DescriptorNode::build(child, path)
            })
            .collect();
        Self {
            descriptor,
            indexes,
            children,
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    pub fn indexes(&self) -> &[i32] {
        &self.indexes
    }

}

#[derive(Debug, Clone)]
pub struct DescriptorTree {
    package: String,
    roots: Vec<DescriptorNode>,
}

impl DescriptorTree {
    pub fn new(file: &FileDescriptor) -> Self {
        let roots = file
            .messages()
            .enumerate()
            .map(|(i, message)| DescriptorNode::build(message, vec![i as i32]))
            .collect();
        Self {
            package: file.package_name().to_string(),
            roots,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find_by_indexes(&self, indexes: &[i32]) -> Option<&DescriptorNode> {
        let (first, rest) = indexes.split_first()?;
        let mut node = self.roots.get(usize::try_from(*first).ok()?)?;
        for index in rest {
            node = node.children.get(usize::try_from(*index).ok()?)?;
        }
        Some(node)
    }

    /// Look up `name`, either fully qualified or relative to the file package
    pub fn find_by_name(&self, name: &str) -> Option<&DescriptorNode> {
        let relative = name.strip_prefix('.').unwrap_or(name);
        let relative = if self.package.is_empty() {
            relative
        } else {
            relative
                .strip_prefix(self.package.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(relative)
        };

        let mut segments = relative.split('.');
        let first = segments.next()?;
        let mut node = self.roots.iter().find(|n| n.descriptor.name() == first)?;
        for segment in segments {
            node = node.children.iter().find(|n| n.descriptor.name() == segment)?;
        }
        Some(node)
    }

    /// Every node, depth first
    pub fn nodes(&self) -> Vec<&DescriptorNode> {
        let mut nodes = Vec::new();
        let mut stack: Vec<&DescriptorNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            nodes.push(node);
            stack.extend(node.children.iter().rev());
        }
        nodes
    }
}
