/// Ordered set of named dashboard views, exactly one of which is active.
#[derive(Debug, Clone, Default)]
pub struct ViewStack {
    views: Vec<String>,
    active: usize,
}

impl ViewStack {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            views: names.into_iter().map(Into::into).collect(),
            active: 0,
        }
    }

    /// Activate `name`, adding it to the front of the stack if it isn't there yet.
    pub fn focus_named(&mut self, name: &str) {
        match self.views.iter().position(|v| v == name) {
            Some(i) => self.active = i,
            None => {
                self.views.insert(0, name.to_string());
                self.active = 0;
            }
        }
    }

    pub fn next(&mut self) {
        if !self.views.is_empty() {
            self.active = (self.active + 1) % self.views.len();
        }
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn active_name(&self) -> Option<&str> {
        self.views.get(self.active).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.views
    }
}
