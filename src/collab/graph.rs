//! 依赖图
//!
//! 使用邻接表和入度表实现 DAG 拓扑排序；同入度的节点按插入顺序出队，保证结果确定

use std::collections::{HashMap, VecDeque};

use crate::core::{CollabError, CollabResult};

/// 依赖图：边 from → to 表示 to 必须在 from 之后执行
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点插入顺序
    nodes: Vec<String>,
    /// 邻接表：节点 -> 依赖该节点的节点列表
    pub adjacency: HashMap<String, Vec<String>>,
    /// 入度表：节点 -> 依赖数
    pub in_degree: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由 (节点, 依赖列表) 构建；依赖中出现的未知节点会被自动加入
    pub fn from_dependencies<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut graph = Self::new();
        let items: Vec<_> = items.into_iter().collect();
        for (node, _) in &items {
            graph.add_node(node);
        }
        for (node, deps) in items {
            for dep in deps {
                graph.add_edge(dep, node);
            }
        }
        graph
    }

    pub fn add_node(&mut self, node: &str) {
        if !self.in_degree.contains_key(node) {
            self.nodes.push(node.to_string());
            self.in_degree.insert(node.to_string(), 0);
            self.adjacency.insert(node.to_string(), Vec::new());
        }
    }

    /// 添加依赖边：to 依赖 from
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);
        let dependents = self.adjacency.entry(from.to_string()).or_default();
        if dependents.iter().any(|d| d == to) {
            return;
        }
        dependents.push(to.to_string());
        *self.in_degree.entry(to.to_string()).or_insert(0) += 1;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 直接依赖某节点的节点
    pub fn dependents(&self, node: &str) -> &[String] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Kahn 拓扑排序；存在环时返回 CyclicDependency（附环上节点）
    pub fn topological_order(&self) -> CollabResult<Vec<String>> {
        let mut in_degree = self.in_degree.clone();
        let mut queue: VecDeque<String> = self
            .nodes
            .iter()
            .filter(|n| in_degree.get(*n) == Some(&0))
            .cloned()
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            for dependent in self.dependents(&node) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.clone());
                    }
                }
            }
            order.push(node);
        }

        if order.len() != self.nodes.len() {
            let cyclic: Vec<String> = self
                .nodes
                .iter()
                .filter(|n| !order.contains(n))
                .cloned()
                .collect();
            return Err(CollabError::CyclicDependency(cyclic.join(", ")));
        }

        Ok(order)
    }
}
