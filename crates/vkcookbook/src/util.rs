use ash::vk;

///A region of an image, described by its offset and extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageRegion {
    pub offset: vk::Offset3D,
    pub extent: vk::Extent3D,
}

impl ImageRegion {
    ///The offset of the region's far corner. Needed for blit regions.
    pub fn end_offset(&self) -> vk::Offset3D {
        let end = extent_to_offset(self.extent, true);
        vk::Offset3D {
            x: self.offset.x + end.x,
            y: self.offset.y + end.y,
            z: self.offset.z + end.z,
        }
    }
}

///Converts a [Extent3D](ash::vk::Extent3D) to an offset. Needed for instance to convert
/// an image's extent to the offset parameter for image-blit or copy operations.
///
/// If `zero_to_one` is set, makes coordinates 1 that are 0 in the extent. This is for instance the requirement on the `dst_offset` parameter
/// of image_blit.
pub fn extent_to_offset(extent: vk::Extent3D, zero_to_one: bool) -> vk::Offset3D {
    if zero_to_one {
        vk::Offset3D {
            //Note: max is correct since we are casting from a u32
            x: (extent.width as i32).max(1),
            y: (extent.height as i32).max(1),
            z: (extent.depth as i32).max(1),
        }
    } else {
        vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: extent.depth as i32,
        }
    }
}

///Rounds `value` up to the next multiple of `alignment`. An alignment of 0 or 1 returns `value`.
pub fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

///Rounds `value` down to the previous multiple of `alignment`. An alignment of 0 or 1 returns `value`.
pub fn align_down(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment <= 1 {
        return value;
    }
    (value / alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(13, 0), 13);

        assert_eq!(align_down(63, 64), 0);
        assert_eq!(align_down(130, 64), 128);
        assert_eq!(align_down(13, 1), 13);
    }

    #[test]
    fn zero_extent_becomes_one() {
        let offset = extent_to_offset(
            vk::Extent3D {
                width: 16,
                height: 8,
                depth: 0,
            },
            true,
        );
        assert_eq!(offset, vk::Offset3D { x: 16, y: 8, z: 1 });

        let region = ImageRegion {
            offset: vk::Offset3D { x: 2, y: 2, z: 0 },
            extent: vk::Extent3D {
                width: 4,
                height: 4,
                depth: 1,
            },
        };
        assert_eq!(region.end_offset(), vk::Offset3D { x: 6, y: 6, z: 1 });
    }
}
