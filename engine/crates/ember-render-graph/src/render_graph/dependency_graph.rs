//! 依赖图构建和拓扑排序
//!
//! 只使用 pass 显式声明的 `depends_on` 边，不从读写关系推断顺序。

use std::collections::VecDeque;

/// Pass 之间的依赖图
pub struct RgDependencyGraph {
    pass_count: usize,
    /// 邻接表（出边）：producer -> [consumer]
    adjacency: Vec<Vec<usize>>,
    in_degrees: Vec<usize>,
}

impl RgDependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
        }
    }

    /// 添加依赖边：`producer` 必须先于 `consumer` 执行
    ///
    /// 重复的边只计一次，越界的索引被忽略。
    pub fn add_edge(&mut self, producer: usize, consumer: usize) {
        if producer >= self.pass_count || consumer >= self.pass_count {
            log::warn!("RgDependencyGraph: edge {} -> {} out of range", producer, consumer);
            return;
        }
        if !self.adjacency[producer].contains(&consumer) {
            self.adjacency[producer].push(consumer);
            self.in_degrees[consumer] += 1;
        }
    }

    /// Kahn 拓扑排序，就绪队列按声明顺序 FIFO
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 Pass 索引列表
    /// - `Err(cycle)`: 存在环，返回没能排进顺序的 Pass 索引
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut queue: VecDeque<usize> = (0..self.pass_count).filter(|&i| in_degrees[i] == 0).collect();
        let mut result = Vec::with_capacity(self.pass_count);

        while let Some(node) = queue.pop_front() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        if result.len() != self.pass_count {
            Err((0..self.pass_count).filter(|&i| in_degrees[i] > 0).collect())
        } else {
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[usize], pass: usize) -> usize {
        order.iter().position(|&p| p == pass).unwrap()
    }

    #[test]
    fn test_chain_dependency() {
        // Pass 2 -> Pass 0 -> Pass 1
        let mut graph = RgDependencyGraph::new(3);
        graph.add_edge(2, 0);
        graph.add_edge(0, 1);

        assert_eq!(graph.topological_sort().unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        let graph = RgDependencyGraph::new(4);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_diamond_is_topologically_valid() {
        //     0
        //    / \
        //   1   2
        //    \ /
        //     3
        let mut graph = RgDependencyGraph::new(4);
        let edges = [(0, 1), (0, 2), (1, 3), (2, 3)];
        for (p, c) in edges {
            graph.add_edge(p, c);
        }

        let order = graph.topological_sort().unwrap();
        assert_eq!(order.len(), 4);
        for (p, c) in edges {
            assert!(position(&order, p) < position(&order, c), "{p} must run before {c}");
        }
    }

    #[test]
    fn test_duplicate_edges_are_counted_once() {
        let mut graph = RgDependencyGraph::new(2);
        graph.add_edge(0, 1);
        graph.add_edge(0, 1);

        // 重复计入入度时 pass 1 永远不会就绪
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_cycle_detection() {
        // 0 <-> 1，2 独立
        let mut graph = RgDependencyGraph::new(3);
        graph.add_edge(0, 1);
        graph.add_edge(1, 0);

        assert_eq!(graph.topological_sort().unwrap_err(), vec![0, 1]);
    }

    #[test]
    fn test_out_of_range_edge_is_ignored() {
        let mut graph = RgDependencyGraph::new(1);
        graph.add_edge(0, 3);
        assert_eq!(graph.topological_sort().unwrap(), vec![0]);
    }
}
