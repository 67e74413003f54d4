use crate::interlude::*;

use crate::task::Task;

/// An ordered bag of tasks, addressable by name or position.
///
/// Lookups are linear scans returning the first match. The collection
/// does no de-duplication of its own, that's the job of the install
/// policy.
#[derive(Debug, Clone, Default)]
pub struct TaskCollection {
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy)]
pub enum TaskKey<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for TaskKey<'a> {
    fn from(value: &'a str) -> Self {
        Self::Name(value)
    }
}

impl<'a> From<&'a String> for TaskKey<'a> {
    fn from(value: &'a String) -> Self {
        Self::Name(value)
    }
}

impl From<usize> for TaskKey<'_> {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl TaskCollection {
    pub fn new() -> Self {
        default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn lookup<'a>(&self, key: impl Into<TaskKey<'a>>) -> Option<&Task> {
        match key.into() {
            TaskKey::Name(name) => self.tasks.iter().find(|task| task.name() == name),
            TaskKey::Index(idx) => self.tasks.get(idx),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.iter().any(|task| task.name() == name)
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Appends every task from `other` in order. Accepts another
    /// collection or any sequence of tasks.
    pub fn merge(&mut self, other: impl IntoIterator<Item = Task>) {
        self.tasks.extend(other);
    }

    /// Removes every task going by `name`, returning how many went.
    pub fn remove_by_name(&mut self, name: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.name() != name);
        before - self.tasks.len()
    }

    /// Definition file text for all the tasks, one blank line apart.
    pub fn render(&self) -> String {
        self.tasks
            .iter()
            .map(Task::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn sorted(&self) -> Self {
        let mut tasks = self.tasks.clone();
        // stable so duplicate names keep their relative order
        tasks.sort();
        Self { tasks }
    }

    /// Tasks whose name or comment matches `pattern`.
    pub fn filtered(&self, pattern: &TaskPattern) -> Self {
        self.tasks
            .iter()
            .filter(|task| pattern.matches(task))
            .cloned()
            .collect()
    }
}

impl IntoIterator for TaskCollection {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl<'a> IntoIterator for &'a TaskCollection {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

impl FromIterator<Task> for TaskCollection {
    fn from_iter<T: IntoIterator<Item = Task>>(iter: T) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Task>> for TaskCollection {
    fn from(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }
}

/// Listing filter. Patterns are regular expressions, anything that
/// doesn't compile as one is matched literally.
#[derive(Debug, Clone)]
pub struct TaskPattern(regex::Regex);

impl TaskPattern {
    pub fn new(raw: &str) -> Self {
        let re = regex::Regex::new(raw)
            .or_else(|_| regex::Regex::new(&regex::escape(raw)))
            .expect_or_log("escaped pattern must compile");
        Self(re)
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.0.is_match(task.name()) || task.comment().is_some_and(|c| self.0.is_match(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, body: &str) -> Task {
        Task::new(name, vec![], vec![], None, body)
    }

    #[test]
    fn lookup_is_first_match() {
        let tasks: TaskCollection =
            vec![task("a", "puts 1"), task("b", ""), task("a", "puts 2")].into();
        assert_eq!(tasks.lookup("a").map(Task::body), Some("puts 1"));
        assert_eq!(tasks.lookup(1usize).map(Task::name), Some("b"));
        assert!(tasks.lookup("missing").is_none());
        assert!(tasks.lookup(7usize).is_none());
    }

    #[test]
    fn remove_by_name_takes_all() {
        let mut tasks: TaskCollection = vec![task("a", "1"), task("b", ""), task("a", "2")].into();
        assert_eq!(tasks.remove_by_name("a"), 2);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.remove_by_name("a"), 0);
        assert!(!tasks.contains("a"));
        assert!(tasks.contains("b"));
    }

    #[test]
    fn merge_keeps_order_and_duplicates() {
        let mut tasks: TaskCollection = vec![task("a", "")].into();
        let other: TaskCollection = vec![task("c", ""), task("a", "")].into();
        tasks.merge(other);
        tasks.merge(vec![task("b", "")]);
        let names = tasks.iter().map(Task::name).collect::<Vec<_>>();
        assert_eq!(names, ["a", "c", "a", "b"]);
    }

    #[test]
    fn render_separates_with_blank_line() {
        let tasks: TaskCollection = vec![task("a", ""), task("b", "  puts 1")].into();
        assert_eq!(
            tasks.render(),
            "task 'a' do\nend\n\ntask 'b' do\n  puts 1\nend\n"
        );
        assert_eq!(TaskCollection::new().render(), "");
    }

    #[test]
    fn sorted_by_name() {
        let tasks: TaskCollection = vec![task("web:start", ""), task("db:migrate", "")].into();
        let names = tasks
            .sorted()
            .iter()
            .map(|t| t.name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["db:migrate", "web:start"]);
    }

    #[test]
    fn pattern_matches_name_or_comment() {
        let tasks: TaskCollection = vec![
            Task::new("db:migrate", vec![], vec![], Some("Migrate".into()), ""),
            Task::new("web:start", vec![], vec![], Some("Boot the web tier".into()), ""),
            Task::new("cache:clear", vec![], vec![], Some("Flush db caches".into()), ""),
        ]
        .into();
        let names = |pat: &str| {
            tasks
                .filtered(&TaskPattern::new(pat))
                .iter()
                .map(|t| t.name().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(names("db"), ["db:migrate", "cache:clear"]);
        assert_eq!(names("^web"), ["web:start"]);
        // not a valid regex, taken literally
        assert_eq!(names("start("), Vec::<String>::new());
    }
}
